//! imgconvert - IMAGE FORMAT CONVERTER
//!
//! 메인 엔트리포인트

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use walkdir::WalkDir;

use imgconvert::{
    batch::{BatchEvent, BatchLimits, Orchestrator, RejectReason, Rejected},
    cli::{Args, WriteMode},
    convert::ConvertOptions,
    error::ImgConvertError,
    export::{self, ARCHIVE_NAME},
    item::{ItemId, ItemSnapshot, ItemStatus, SourceFile},
    pattern::FileFilter,
    registry,
    report::{write_report, BatchReport},
    stats::{format_bytes, Statistics},
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 로깅 설정 (RUST_LOG가 있으면 우선)
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if args.verbose {
            "imgconvert=debug".to_string()
        } else {
            "warn".to_string()
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    // 인코딩 스레드 풀 설정
    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|e| ImgConvertError::ThreadPoolError {
                reason: e.to_string(),
            })?;
    }

    // 입력 경로 확인
    validate_input(&args)?;

    // 헤더 출력
    print_header(&args);

    let filter = FileFilter::new(args.pattern.clone())?;
    let overrides = args.target_overrides()?;

    // 이미지 파일 수집
    let image_files = collect_image_files(&args, &filter)?;

    if image_files.is_empty() {
        println!("{}", "⚠️ 처리할 이미지 파일이 없습니다.".yellow());
        return Ok(());
    }

    println!(
        "  {} 발견된 파일 수: {}",
        "📋".bright_white(),
        image_files.len().to_string().bright_green()
    );

    let mut stats = Statistics::new(image_files.len());
    let options = ConvertOptions::new()
        .with_max_edge(args.max_edge)
        .with_max_output_bytes(args.max_output_mb.saturating_mul(1024 * 1024));
    let orchestrator = Orchestrator::new(BatchLimits::new(), options);

    // 파일 읽기 (크기 초과 파일은 읽지 않음)
    let (sources, mut rejected, mut errors) =
        read_sources(&image_files, orchestrator.limits(), &mut stats);

    let admission = orchestrator.enqueue(sources);
    rejected.extend(admission.rejected);
    stats.record_rejected(rejected.len());

    // 대상 포맷 지정
    for id in &admission.accepted {
        let Some(item) = orchestrator.get(*id) else {
            continue;
        };
        if let Some(target) = args.target_for(&overrides, &item.name) {
            orchestrator.set_target(*id, &target)?;
        }
    }

    print_rejected(&rejected);

    if orchestrator.is_empty() {
        print_errors(&errors, args.verbose);
        return Err(ImgConvertError::NoFilesFound.into());
    }

    // 드라이런 모드
    if args.dry_run {
        print_dry_run(&orchestrator.items());
        return Ok(());
    }

    if !orchestrator.has_pending() {
        println!(
            "\n{}",
            "⚠️ 대상 포맷이 지정된 파일이 없습니다. -t 또는 --target 옵션을 확인하세요.".yellow()
        );
        return Ok(());
    }

    // 출력 모드 확인
    let planned = planned_outputs(&args, &orchestrator.items());
    check_output_mode(&args, &planned)?;

    // 변환 실행
    println!("\n{}", "⚡ 변환 중...".bright_cyan());

    let progress = spawn_progress(&orchestrator, MultiProgress::new());
    let summary = orchestrator.run_all().await?;
    join_progress(progress).await;

    // 결과 저장
    println!("\n{}", "💾 결과 저장 중...".bright_cyan());
    let written = write_outputs(&args, &orchestrator, &mut stats)?;

    let items = orchestrator.items();
    for item in &items {
        stats.record_item(item);
        match item.status {
            ItemStatus::Finished if args.verbose => {
                println!("  {} {} → {}", "✓".green(), item.name, item.target_format);
            }
            ItemStatus::Error => errors.push((
                item.name.clone(),
                item.error_message.clone().unwrap_or_default(),
            )),
            _ => {}
        }
    }

    // 에러 출력
    print_errors(&errors, args.verbose);

    // 로그 파일 작성
    if let Some(ref log_path) = args.log {
        write_error_log(log_path, &errors)?;
    }

    // 보고서 작성
    if let Some(ref report_path) = args.report {
        let report = BatchReport::new(summary, items, rejected);
        write_report(report_path, &report)
            .with_context(|| format!("보고서 저장 실패: {:?}", report_path))?;
        println!("\n{} 보고서 저장: {:?}", "📝".bright_cyan(), report_path);
    }

    // 통계 출력
    stats.print_summary();

    for path in &written {
        println!("  {} {:?}", "📄".bright_green(), path);
    }
    println!("\n{} 저장 완료: {:?}\n", "✅".bright_green(), args.output);

    Ok(())
}

/// 입력 경로 유효성 검사
fn validate_input(args: &Args) -> Result<()> {
    for input in &args.input {
        if !input.exists() {
            return Err(ImgConvertError::InputNotFound {
                path: input.clone(),
            }
            .into());
        }
    }

    if args.output.exists() && !args.output.is_dir() {
        anyhow::bail!("출력 경로가 폴더가 아닙니다: {:?}", args.output);
    }

    Ok(())
}

/// 헤더 출력
fn print_header(args: &Args) {
    println!("\n{}", "═".repeat(50).bright_blue());
    println!("{}", " 🚀 IMAGE FORMAT CONVERTER".bright_white().bold());
    println!("{}", "═".repeat(50).bright_blue());

    for input in &args.input {
        println!("  {} 입력: {:?}", "📂".bright_cyan(), input);
    }

    println!("  {} 출력 폴더: {:?}", "📄".bright_green(), args.output);

    if let Some(ref to) = args.to {
        println!("  {} 대상 포맷: {}", "🎯".bright_cyan(), to);
    }

    if !args.targets.is_empty() {
        println!(
            "  {} 개별 지정: {}",
            "🎯".bright_cyan(),
            args.targets.join(", ")
        );
    }

    println!("  {} 모드: {}", "⚙️".bright_yellow(), args.mode);

    if args.zip {
        println!("  {} ZIP 묶음: {}", "📦".bright_magenta(), ARCHIVE_NAME);
    }

    if let Some(ref pattern) = args.pattern {
        println!("  {} 패턴 필터: {}", "🔍".bright_magenta(), pattern);
    }

    if let Some(depth) = args.max_depth {
        println!("  {} 최대 깊이: {}", "📏".bright_white(), depth);
    }

    if args.dry_run {
        println!(
            "  {} {}",
            "⚠️".bright_yellow(),
            "드라이런 모드 (실제 변환 없음)".yellow()
        );
    }

    println!("{}", "═".repeat(50).bright_blue());
    println!("\n{}", "📁 파일 검색 중...".bright_cyan());
}

/// 이미지 파일 수집
///
/// 직접 지정한 파일은 그대로 두고 (확장자 검사는 배치 등록 시 수행),
/// 폴더는 탐색하여 필터에 맞는 이미지 파일만 모읍니다.
fn collect_image_files(args: &Args, filter: &FileFilter) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for input in &args.input {
        if input.is_file() {
            files.push(input.clone());
            continue;
        }

        let walker = if let Some(max_depth) = args.max_depth {
            WalkDir::new(input).max_depth(max_depth)
        } else {
            WalkDir::new(input)
        };

        let mut found: Vec<PathBuf> = walker
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .filter(|e| filter.accepts(e.path()))
            .map(|e| e.path().to_path_buf())
            .collect();
        found.sort();
        files.extend(found);
    }

    Ok(files)
}

/// 파일 읽기
///
/// 크기 제한을 넘는 파일은 내용을 읽지 않고 바로 거부합니다.
fn read_sources(
    paths: &[PathBuf],
    limits: &BatchLimits,
    stats: &mut Statistics,
) -> (Vec<SourceFile>, Vec<Rejected>, Vec<(String, String)>) {
    let mut sources = Vec::new();
    let mut rejected = Vec::new();
    let mut errors = Vec::new();

    for path in paths {
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let size = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                stats.record_read_error();
                errors.push((name, e.to_string()));
                continue;
            }
        };

        if size > limits.max_file_size {
            rejected.push(Rejected {
                name,
                reason: RejectReason::TooLarge {
                    size,
                    limit: limits.max_file_size,
                },
            });
            continue;
        }

        match fs::read(path) {
            Ok(data) => {
                stats.record_read(data.len() as u64);
                sources.push(SourceFile::new(name, data));
            }
            Err(e) => {
                stats.record_read_error();
                errors.push((name, e.to_string()));
            }
        }
    }

    (sources, rejected, errors)
}

/// 거부된 파일 출력
fn print_rejected(rejected: &[Rejected]) {
    if rejected.is_empty() {
        return;
    }

    println!("\n{}", "🚫 거부된 파일:".bright_yellow());
    for r in rejected {
        println!("  {} {} ({})", "•".yellow(), r.name, r.reason);
    }
}

/// 드라이런 출력
fn print_dry_run(items: &[ItemSnapshot]) {
    println!("\n{}", "📋 처리 예정 파일 목록:".bright_cyan());
    for (i, item) in items.iter().enumerate() {
        let target = dry_run_target(item);
        println!(
            "  {}. {} [{}] → {}",
            i + 1,
            item.name,
            format_bytes(item.size),
            target
        );
    }
    println!(
        "\n{} 총 {} 개의 파일이 처리될 예정입니다.",
        "ℹ️".bright_blue(),
        items.len().to_string().bright_green()
    );
}

/// 드라이런 대상 포맷 표시
///
/// 포맷이 없거나 원본에서 변환할 수 없는 포맷이면 선택 가능한 목록을 함께 보여줍니다.
fn dry_run_target(item: &ItemSnapshot) -> String {
    let choices = item.convertible_formats();
    if choices.iter().any(|f| f.as_str() == item.target_format) {
        return item.target_format.bright_green().to_string();
    }

    let listed = choices
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let label = if item.target_format.is_empty() {
        "(포맷 없음)".to_string()
    } else {
        format!("{} (변환 불가)", item.target_format)
    };
    format!("{} {}", label.dimmed(), format!("[가능: {}]", listed).dimmed())
}

/// 변환 후 생성될 출력 파일 경로
fn planned_outputs(args: &Args, items: &[ItemSnapshot]) -> Vec<PathBuf> {
    if args.zip {
        return vec![args.output.join(ARCHIVE_NAME)];
    }

    let mut used = HashSet::new();
    items
        .iter()
        .filter(|item| item.status == ItemStatus::Waiting && !item.target_format.is_empty())
        .map(|item| {
            let name = registry::output_name(&item.name, &item.target_format);
            args.output.join(export::unique_name(&name, &mut used))
        })
        .collect()
}

/// 출력 모드 확인
fn check_output_mode(args: &Args, planned: &[PathBuf]) -> Result<()> {
    if args.mode == WriteMode::Error {
        if let Some(existing) = planned.iter().find(|p| p.exists()) {
            return Err(ImgConvertError::OutputExists {
                path: existing.clone(),
            }
            .into());
        }
    }
    Ok(())
}

/// 항목별 진행률 바 갱신 작업 시작
///
/// `run_all` 호출 전에 구독해야 시작 이벤트를 놓치지 않습니다.
fn spawn_progress(orchestrator: &Orchestrator, multi: MultiProgress) -> JoinHandle<()> {
    let mut events = orchestrator.subscribe();

    tokio::spawn(async move {
        let mut bars: HashMap<ItemId, ProgressBar> = HashMap::new();

        loop {
            match events.recv().await {
                Ok(BatchEvent::Updated(item)) => {
                    let bar = bars
                        .entry(item.id)
                        .or_insert_with(|| multi.add(create_item_bar(&item.name)));
                    bar.set_position(u64::from(item.progress));

                    match item.status {
                        ItemStatus::Finished => bar.finish_with_message("완료"),
                        ItemStatus::Error => bar.abandon_with_message("실패"),
                        _ => {}
                    }
                }
                Ok(BatchEvent::RunFinished(_)) | Err(RecvError::Closed) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "진행률 이벤트 누락");
                }
            }
        }
    })
}

/// 진행률 작업 종료 대기
///
/// 패닉으로 끝난 경우 디버그 로그만 남깁니다.
async fn join_progress(progress: JoinHandle<()>) -> bool {
    match progress.await {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(error = %e, "진행률 표시 작업 비정상 종료");
            false
        }
    }
}

/// 항목 진행률 바 생성
fn create_item_bar(name: &str) -> ProgressBar {
    let pb = ProgressBar::new(100);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} {prefix:<24} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░");
    pb.set_style(style);
    pb.set_prefix(name.to_string());
    pb
}

/// 변환 결과 저장
///
/// `--zip`이면 묶음 하나를 쓰고, 묶음 생성에 실패하면 항목별 파일로 대신 저장합니다.
fn write_outputs(
    args: &Args,
    orchestrator: &Orchestrator,
    stats: &mut Statistics,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(&args.output)
        .with_context(|| format!("출력 폴더 생성 실패: {:?}", args.output))?;

    if args.zip {
        match orchestrator.export_all() {
            Ok(archive) => {
                let path = args.output.join(&archive.file_name);
                write_file(&path, &archive.blob.data)?;
                stats.record_written(archive.blob.len() as u64);
                return Ok(vec![path]);
            }
            Err(e @ ImgConvertError::Bundling { .. }) => {
                println!(
                    "  {} {} ({})",
                    "⚠️".bright_yellow(),
                    "ZIP 생성 실패, 파일별로 저장합니다".yellow(),
                    e
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    let mut used = HashSet::new();
    let mut written = Vec::new();

    for item in orchestrator.items() {
        if item.status != ItemStatus::Finished {
            continue;
        }
        let download = orchestrator.download(item.id)?;
        let path = args
            .output
            .join(export::unique_name(&download.file_name, &mut used));
        write_file(&path, &download.blob.data)?;
        stats.record_written(download.blob.len() as u64);
        written.push(path);
    }

    Ok(written)
}

fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    fs::write(path, data).map_err(|e| ImgConvertError::WriteError {
        reason: format!("{:?}: {}", path, e),
    })?;
    Ok(())
}

/// 에러 목록 출력
fn print_errors(errors: &[(String, String)], verbose: bool) {
    if errors.is_empty() {
        return;
    }

    println!("\n{}", "❌ 오류 발생 파일:".bright_red());
    for (name, error) in errors {
        println!("  {} {}", "•".red(), name);
        if verbose {
            println!("    {}", error.dimmed());
        }
    }
}

/// 에러 로그 파일 작성
fn write_error_log(log_path: &Path, errors: &[(String, String)]) -> Result<()> {
    let mut log_file = File::create(log_path)?;

    writeln!(log_file, "imgconvert 에러 로그")?;
    writeln!(log_file, "생성 시간: {}", unix_now())?;
    writeln!(log_file, "총 에러 수: {}", errors.len())?;
    writeln!(log_file, "{}", "=".repeat(50))?;

    for (name, error) in errors {
        writeln!(log_file, "\n파일: {}", name)?;
        writeln!(log_file, "에러: {}", error)?;
    }

    println!("\n{} 에러 로그 저장: {:?}", "📝".bright_cyan(), log_path);

    Ok(())
}

/// 현재 시간 문자열 반환
fn unix_now() -> String {
    use std::time::SystemTime;
    let duration = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    format!("Unix timestamp: {}", duration.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn args_for(input: &Path, extra: &[&str]) -> Args {
        let mut argv = vec!["imgconvert", "-i", input.to_str().unwrap()];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_collect_image_files() {
        let temp_dir = TempDir::new().unwrap();
        create_test_file(temp_dir.path(), "a.png", b"x");
        create_test_file(temp_dir.path(), "b.JPG", b"x");
        create_test_file(temp_dir.path(), "notes.txt", b"x");
        create_test_file(temp_dir.path(), "doc.pdf", b"x");

        let args = args_for(temp_dir.path(), &[]);
        let filter = FileFilter::new(None).unwrap();
        let files = collect_image_files(&args, &filter).unwrap();

        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_collect_image_files_with_pattern() {
        let temp_dir = TempDir::new().unwrap();
        create_test_file(temp_dir.path(), "IMG_0001.png", b"x");
        create_test_file(temp_dir.path(), "IMG_0002.gif", b"x");
        create_test_file(temp_dir.path(), "scan.png", b"x");

        let args = args_for(temp_dir.path(), &["--pattern", "IMG_*"]);
        let filter = FileFilter::new(args.pattern.clone()).unwrap();
        let files = collect_image_files(&args, &filter).unwrap();

        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_max_depth() {
        let temp_dir = TempDir::new().unwrap();
        let sub_dir = temp_dir.path().join("subdir");
        fs::create_dir(&sub_dir).unwrap();
        let deep_dir = sub_dir.join("deep");
        fs::create_dir(&deep_dir).unwrap();

        create_test_file(temp_dir.path(), "root.png", b"x");
        create_test_file(&sub_dir, "level1.png", b"x");
        create_test_file(&deep_dir, "level2.png", b"x");

        // depth 0 (폴더 자신), 1, 까지만 탐색하므로 level2.png 제외
        let args = args_for(temp_dir.path(), &["--max-depth", "2"]);
        let filter = FileFilter::new(None).unwrap();
        let files = collect_image_files(&args, &filter).unwrap();

        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_explicit_file_is_kept_unfiltered() {
        let temp_dir = TempDir::new().unwrap();
        let path = create_test_file(temp_dir.path(), "notes.txt", b"x");

        let args = args_for(&path, &[]);
        let filter = FileFilter::new(None).unwrap();
        let files = collect_image_files(&args, &filter).unwrap();

        assert_eq!(files, vec![path]);
    }

    #[test]
    fn test_read_sources_rejects_oversized_without_reading() {
        let temp_dir = TempDir::new().unwrap();
        let small = create_test_file(temp_dir.path(), "small.png", &[0u8; 8]);
        let big = create_test_file(temp_dir.path(), "big.png", &[0u8; 32]);

        let limits = BatchLimits::new().with_max_file_size(16);
        let mut stats = Statistics::new(2);
        let (sources, rejected, errors) = read_sources(&[small, big], &limits, &mut stats);

        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name, "small.png");
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].name, "big.png");
        assert!(errors.is_empty());
        assert_eq!(stats.bytes_read, 8);
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn test_dry_run_target_lists_choices() {
        colored::control::set_override(false);
        let mut item = ItemSnapshot {
            id: ItemId::new(),
            name: "photo.png".to_string(),
            size: 10,
            source_extension: "png".to_string(),
            target_format: "webp".to_string(),
            status: ItemStatus::Waiting,
            progress: 0,
            output_name: None,
            output_type: None,
            output_size: None,
            error_message: None,
        };
        assert_eq!(dry_run_target(&item), "webp");

        item.target_format = "png".to_string();
        let shown = dry_run_target(&item);
        assert!(shown.starts_with("png (변환 불가)"));
        assert!(shown.contains("jpg, jpeg, webp, gif, bmp, pdf"));

        item.target_format.clear();
        assert!(dry_run_target(&item).starts_with("(포맷 없음)"));
    }

    #[tokio::test]
    async fn test_join_progress_survives_panicked_task() {
        let ok = tokio::spawn(async {});
        assert!(join_progress(ok).await);

        let panicked = tokio::spawn(async { panic!("진행률 바 오류") });
        assert!(!join_progress(panicked).await);
    }

    #[test]
    fn test_check_output_mode_error() {
        let temp_dir = TempDir::new().unwrap();
        let existing = create_test_file(temp_dir.path(), "converted-files.zip", b"x");

        let args = Args::parse_from([
            "imgconvert",
            "-i",
            "a.png",
            "-o",
            temp_dir.path().to_str().unwrap(),
            "--zip",
            "--mode",
            "error",
        ]);
        let planned = planned_outputs(&args, &[]);
        assert_eq!(planned, vec![existing]);
        assert!(check_output_mode(&args, &planned).is_err());

        let overwrite = Args::parse_from([
            "imgconvert",
            "-i",
            "a.png",
            "-o",
            temp_dir.path().to_str().unwrap(),
            "--zip",
        ]);
        assert!(check_output_mode(&overwrite, &planned).is_ok());
    }

    #[test]
    fn test_write_error_log() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("errors.log");
        let errors = vec![("broken.png".to_string(), "디코딩 실패".to_string())];

        write_error_log(&log_path, &errors).unwrap();

        let content = fs::read_to_string(&log_path).unwrap();
        assert!(content.contains("총 에러 수: 1"));
        assert!(content.contains("broken.png"));
    }
}
