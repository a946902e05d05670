use manimgen::dataset::{
    builder, matcher, read_json, report, save_videos, DatasetIndex, MatchType, VideoMeta,
};
use std::path::Path;

fn video(id: &str, title: &str, year: i32, has_transcript: bool) -> VideoMeta {
    VideoMeta {
        video_id: id.into(),
        url: format!("https://www.youtube.com/watch?v={}", id),
        title: title.into(),
        published_at: format!("{}-03-14T15:00:00Z", year),
        year,
        has_transcript: Some(has_transcript),
        ..Default::default()
    }
}

fn write(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

#[test]
fn test_match_build_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let work = dir.path();
    let repo = work.join("3b1b_repo");
    write(
        &repo.join("_2019/hamming_codes.py"),
        "# Hamming codes\nclass HammingCodes(Scene): pass\n",
    );
    write(&repo.join("_2020/bayes/bayes_theorem.py"), "bayes theorem, the geometry");
    write(&repo.join("_2020/bayes/helpers.py"), "");

    let transcripts = work.join("transcripts");
    write(&transcripts.join("X8jsijhllIA_clean.txt"), "hello");
    write(&transcripts.join("X8jsijhllIA_timestamped.txt"), "[00:00:00] hello\n");

    let videos_file = work.join("3b1b_videos.json");
    save_videos(
        &videos_file,
        &[
            video("X8jsijhllIA", "Hamming codes", 2019, true),
            video("HZGCoVF3YvM", "Bayes theorem", 2020, false),
            video("zzzzzzzzzzz", "Winding numbers and domain coloring", 2018, false),
        ],
    )
    .unwrap();

    let (with_code, summary) = matcher::match_all(&videos_file, &repo).unwrap();
    assert_eq!(with_code, work.join("3b1b_videos_with_code.json"));
    assert_eq!(summary.total, 3);
    assert_eq!(summary.matched, 2);
    assert_eq!(summary.high_confidence, 2);

    let out = work.join("3b1b_dataset");
    let index = builder::build_dataset(&with_code, &transcripts, &repo, &out).unwrap();
    assert_eq!(index.videos_with_code, 2);
    assert_eq!(index.videos_with_transcripts, 1);
    assert!(out.join("X8jsijhllIA/code/hamming_codes.py").exists());
    assert!(out.join("X8jsijhllIA/transcript_clean.txt").exists());
    assert!(out.join("HZGCoVF3YvM/code/bayes_theorem.py").exists());

    let on_disk: DatasetIndex = read_json(&out.join("index.json")).unwrap();
    assert_eq!(on_disk.total_videos, 3);
    assert_eq!(on_disk.videos[1].match_type, Some(MatchType::File));

    let missing = report::format_missing(&on_disk);
    assert!(missing.contains("== 2018 (1 videos) =="));
    assert!(missing.contains("Winding numbers and domain coloring"));

    let quality = report::match_quality(&on_disk, 42).unwrap();
    assert_eq!(quality.matched, 2);
    assert!(quality.min > matcher::MIN_SCORE);
    assert_eq!(quality.type_counts.get("file"), Some(&2));

    let analysis = report::analyze_missing(&on_disk, &work.join("analysis")).unwrap();
    assert_eq!(analysis.unmatched, 1);
    assert!(work.join("analysis/unmatched_videos.json").exists());
}
