//! CLI 인자 파싱 모듈
//!
//! clap을 사용한 명령줄 인자 정의 및 파싱을 담당합니다.

use clap::{Parser, ValueEnum};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{ImgConvertError, Result};

/// 출력 파일 모드
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq)]
pub enum WriteMode {
    /// 기존 파일이 있으면 덮어쓰기
    #[default]
    Overwrite,
    /// 기존 파일이 있으면 에러
    Error,
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteMode::Overwrite => write!(f, "Overwrite"),
            WriteMode::Error => write!(f, "Error"),
        }
    }
}

/// imgconvert CLI 인자 구조체
#[derive(Parser, Debug)]
#[command(
    name = "imgconvert",
    version,
    about = "IMAGE FORMAT CONVERTER - 이미지 파일을 다른 포맷으로 일괄 변환하는 CLI 도구",
    long_about = r#"
IMAGE FORMAT CONVERTER
======================

이미지 파일(또는 폴더 안의 이미지들)을 지정한 포맷으로 동시에 변환합니다.
한 번에 최대 10개, 파일당 최대 10MB까지 처리합니다.

지원 포맷:
  입력: jpg, jpeg, png, webp, gif, bmp, tiff, svg
  출력: jpg, jpeg, png, webp, gif, bmp, pdf

특징:
  • 항목별 독립 변환 (하나가 실패해도 나머지는 계속)
  • 항목별 진행률 표시
  • 결과를 개별 파일 또는 ZIP 하나로 저장
  • 파일별 대상 포맷 지정 (--target 이름=포맷)
  • JSON 결과 보고서

예제:
  imgconvert -i photo.png -t webp
  imgconvert -i ./photos -t jpg -o ./out --zip
  imgconvert -i a.png -i b.bmp -t png --target a.png=pdf
  imgconvert -i ./photos -t gif --dry-run
"#
)]
pub struct Args {
    /// 입력 이미지 파일 또는 폴더 (여러 번 지정 가능)
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<PathBuf>,

    /// 기본 대상 포맷 (예: jpg, png, webp, pdf)
    #[arg(short = 't', long = "to")]
    pub to: Option<String>,

    /// 파일별 대상 포맷 (이름=포맷, 여러 번 지정 가능)
    #[arg(long = "target", value_name = "NAME=FORMAT")]
    pub targets: Vec<String>,

    /// 변환 결과를 저장할 폴더
    #[arg(short, long, default_value = "converted")]
    pub output: PathBuf,

    /// 결과를 ZIP 하나로 묶어서 저장
    #[arg(long)]
    pub zip: bool,

    /// 출력 파일 모드
    #[arg(short, long, value_enum, default_value_t = WriteMode::Overwrite)]
    pub mode: WriteMode,

    /// 파일 이름 패턴 필터 (glob 형식, 예: "IMG_*", "scan?.png")
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// 상세 출력 모드
    #[arg(short, long)]
    pub verbose: bool,

    /// 실제 변환 없이 처리될 파일 목록만 표시
    #[arg(long)]
    pub dry_run: bool,

    /// 인코딩 스레드 수 (기본값: CPU 코어 수)
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// 최대 폴더 탐색 깊이
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// 에러 로그 파일 경로
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// JSON 결과 보고서 파일 경로
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// 출력 이미지의 최대 변 길이 (픽셀)
    #[arg(long, default_value_t = 2048)]
    pub max_edge: u32,

    /// 출력 파일 하나의 목표 최대 크기 (MB)
    #[arg(long, default_value_t = 2)]
    pub max_output_mb: u64,
}

impl Args {
    /// `--target` 목록을 파일 이름 → 포맷 맵으로 파싱
    ///
    /// 같은 이름이 여러 번 나오면 마지막 값이 사용됩니다.
    pub fn target_overrides(&self) -> Result<HashMap<String, String>> {
        self.targets
            .iter()
            .map(|value| {
                let (name, format) = value
                    .split_once('=')
                    .map(|(n, f)| (n.trim(), f.trim()))
                    .filter(|(n, f)| !n.is_empty() && !f.is_empty())
                    .ok_or_else(|| ImgConvertError::InvalidTarget { value: value.clone() })?;
                Ok((name.to_string(), format.to_lowercase()))
            })
            .collect()
    }

    /// 파일 하나의 대상 포맷 결정 (개별 지정 우선, 없으면 `--to`)
    pub fn target_for(&self, overrides: &HashMap<String, String>, name: &str) -> Option<String> {
        overrides
            .get(name)
            .cloned()
            .or_else(|| self.to.as_ref().map(|t| t.trim().to_lowercase()))
    }
}
