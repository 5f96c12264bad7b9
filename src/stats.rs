//! 통계 및 유틸리티 모듈
//!
//! 배치 결과 집계와 크기/시간 표시 형식을 담당합니다.

use colored::Colorize;
use std::time::{Duration, Instant};

use crate::item::{ItemSnapshot, ItemStatus};

/// 요약 구분선 폭
const RULE_WIDTH: usize = 50;

/// 배치 실행 통계
///
/// 항목 스냅샷을 하나씩 기록해 상태별로 집계합니다.
#[derive(Debug)]
pub struct Statistics {
    /// 발견된 총 파일 수
    pub total_files: usize,
    pub finished: usize,
    /// 변환 실패 + 읽기 실패
    pub failed: usize,
    pub rejected: usize,
    /// 대상 포맷이 없어 대기로 남은 항목
    pub waiting: usize,
    pub bytes_read: u64,
    pub bytes_written: u64,
    started: Instant,
}

impl Statistics {
    pub fn new(total_files: usize) -> Self {
        Self {
            total_files,
            finished: 0,
            failed: 0,
            rejected: 0,
            waiting: 0,
            bytes_read: 0,
            bytes_written: 0,
            started: Instant::now(),
        }
    }

    /// 항목 최종 상태 기록
    pub fn record_item(&mut self, item: &ItemSnapshot) {
        match item.status {
            ItemStatus::Finished => self.finished += 1,
            ItemStatus::Error => self.failed += 1,
            ItemStatus::Waiting => self.waiting += 1,
            ItemStatus::Converting => {}
        }
    }

    /// 파일을 읽지 못한 경우
    pub fn record_read_error(&mut self) {
        self.failed += 1;
    }

    pub fn record_rejected(&mut self, count: usize) {
        self.rejected += count;
    }

    pub fn record_read(&mut self, bytes: u64) {
        self.bytes_read += bytes;
    }

    pub fn record_written(&mut self, bytes: u64) {
        self.bytes_written += bytes;
    }

    /// 변환을 시도한 항목 중 성공 비율 (%)
    pub fn success_rate(&self) -> Option<f64> {
        let attempted = self.finished + self.failed;
        (attempted > 0).then(|| self.finished as f64 * 100.0 / attempted as f64)
    }

    /// 출력/입력 용량 비율 (%)
    pub fn size_ratio(&self) -> Option<f64> {
        (self.bytes_read > 0 && self.bytes_written > 0)
            .then(|| self.bytes_written as f64 * 100.0 / self.bytes_read as f64)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// 변환 통계 요약 출력
    pub fn print_summary(&self) {
        let rule = "═".repeat(RULE_WIDTH);
        println!("\n{}", rule.bright_blue());
        println!("{}", " 📊 변환 결과".bright_white().bold());
        println!("{}", rule.bright_blue());

        row("📁", "발견", self.total_files.to_string().normal());
        row("✅", "완료", self.finished.to_string().green());
        if self.failed > 0 {
            row("❌", "실패", self.failed.to_string().red());
        }
        if self.rejected > 0 {
            row("🚫", "거부", self.rejected.to_string().yellow());
        }
        if self.waiting > 0 {
            row("⏸️", "대기", self.waiting.to_string().yellow());
        }

        row("📥", "입력", format_bytes(self.bytes_read).normal());
        match self.size_ratio() {
            Some(ratio) => row(
                "📤",
                "출력",
                format!("{} ({:.0}%)", format_bytes(self.bytes_written), ratio).normal(),
            ),
            None => row("📤", "출력", format_bytes(self.bytes_written).normal()),
        }

        if let Some(rate) = self.success_rate() {
            row("📈", "성공률", format!("{:.1}%", rate).normal());
        }
        row("⏱️", "소요", format_duration(self.elapsed()).normal());

        println!("{}", rule.bright_blue());
    }
}

fn row(icon: &str, label: &str, value: colored::ColoredString) {
    println!("  {} {:<8} {}", icon, label, value);
}

/// 바이트 수를 사람이 읽기 쉬운 형식으로 변환
///
/// 1024 단위(Bytes, KB, MB, GB)를 쓰고 소수점 둘째 자리에서 반올림하며, 끝의 0은 생략합니다.
///
/// # Examples
/// ```
/// use imgconvert::stats::format_bytes;
///
/// assert_eq!(format_bytes(0), "0 Bytes");
/// assert_eq!(format_bytes(500), "500 Bytes");
/// assert_eq!(format_bytes(1536), "1.5 KB");
/// assert_eq!(format_bytes(10 * 1024 * 1024), "10 MB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}

/// 경과 시간을 읽기 쉬운 형식으로 변환
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        0 => format!("{}ms", duration.subsec_millis()),
        1..=59 => format!("{:.1}초", duration.as_secs_f64()),
        60..=3599 => format!("{}분 {}초", secs / 60, secs % 60),
        _ => format!("{}시간 {}분", secs / 3600, (secs % 3600) / 60),
    }
}
