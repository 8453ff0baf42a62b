//! End-to-end organize runs against a temp library

mod helpers;

use helpers::{list_files, track, CountingLookup, TestLibrary};
use omym::db::maintenance::after_count;
use omym::services::artist_id::generate;
use omym::services::romanization::RomanizationLookup;
use omym::OrganizeError;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[tokio::test]
async fn test_organize_layout_and_second_run_is_no_op() {
    let lib = TestLibrary::new();
    lib.add_track("album/01.mp3", track("Queen", "Opera", "Bohemian", 1975, 1));
    lib.add_track("album/02.flac", track("Queen", "Opera", "Prophet", 1975, 2));
    lib.add_file("album/01.lrc", b"[00:00.00] lyrics");
    lib.add_file("album/cover.jpg", b"jpeg");
    let pool = lib.pool().await;

    let report = lib
        .processor(&pool, false, None)
        .process_path(&lib.source)
        .await
        .unwrap();

    assert_eq!((report.processed, report.skipped, report.failed), (2, 0, 0));
    let id = generate("Queen");
    let album_dir = Path::new("Queen").join("1975_Opera");
    let organized = vec![
        album_dir.join(format!("01_Bohemian_{}.lrc", id)),
        album_dir.join(format!("01_Bohemian_{}.mp3", id)),
        album_dir.join(format!("02_Prophet_{}.flac", id)),
        album_dir.join("cover.jpg"),
    ];
    assert_eq!(list_files(&lib.library), organized);
    assert!(list_files(&lib.source).is_empty());
    assert_eq!(after_count(&pool).await.unwrap(), 2);

    // Organizing the library itself changes nothing
    let report = lib
        .processor_into(&pool, &lib.library, false, None)
        .process_path(&lib.library)
        .await
        .unwrap();

    assert_eq!(report.failed, 0);
    assert_eq!(report.results.len(), 2);
    assert!(report.results.iter().all(|r| r.already_organized));
    assert!(report.quarantined.is_empty());
    assert_eq!(list_files(&lib.library), organized);
    assert_eq!(after_count(&pool).await.unwrap(), 2);
}

#[tokio::test]
async fn test_identical_tags_never_overwrite() {
    let lib = TestLibrary::new();
    lib.add_track("a/song.mp3", track("Queen", "Opera", "Bohemian", 1975, 1));
    lib.add_track("b/song.mp3", track("Queen", "Opera", "Bohemian", 1975, 1));

    let id = generate("Queen");
    let album_dir = lib.library.join("Queen").join("1975_Opera");
    let occupied = album_dir.join(format!("01_Bohemian_{}.mp3", id));
    std::fs::create_dir_all(&album_dir).unwrap();
    std::fs::write(&occupied, b"somebody else's file").unwrap();

    let pool = lib.pool().await;
    let report = lib
        .processor(&pool, false, None)
        .process_path(&lib.source)
        .await
        .unwrap();

    assert_eq!((report.processed, report.failed), (2, 0));
    let targets: Vec<PathBuf> = report
        .results
        .iter()
        .map(|r| r.target_path.clone().unwrap())
        .collect();
    assert_eq!(
        targets,
        vec![
            album_dir.join(format!("01_Bohemian_{} (1).mp3", id)),
            album_dir.join(format!("01_Bohemian_{} (2).mp3", id)),
        ]
    );
    assert_eq!(std::fs::read(&occupied).unwrap(), b"somebody else's file");
    assert_eq!(std::fs::read(&targets[0]).unwrap(), b"audio:a/song.mp3");
    assert_eq!(std::fs::read(&targets[1]).unwrap(), b"audio:b/song.mp3");
}

#[tokio::test]
async fn test_plan_then_organize_agree() {
    let lib = TestLibrary::new();
    lib.add_track("x/1.mp3", track("ひかる", "Album", "One", 2001, 1));
    lib.add_track("x/2.mp3", track("ひかる", "Album", "Two", 2001, 2));
    let lookup = CountingLookup::new(&[("ひかる", "Hikaru")]);
    let pool = lib.pool().await;

    let plan = lib
        .processor(&pool, true, Some(lookup.clone() as Arc<dyn RomanizationLookup>))
        .process_path(&lib.source)
        .await
        .unwrap();

    assert_eq!(plan.failed, 0);
    assert_eq!(lookup.calls(), 1);
    let planned: Vec<(PathBuf, Option<PathBuf>)> = plan
        .results
        .iter()
        .map(|r| (r.source_path.clone(), r.target_path.clone()))
        .collect();
    for (source, target) in &planned {
        assert!(source.exists());
        assert!(target.as_ref().unwrap().starts_with(lib.library.join("Hikaru")));
    }
    assert!(list_files(&lib.library).is_empty());
    assert_eq!(after_count(&pool).await.unwrap(), 0);

    let report = lib
        .processor(&pool, false, Some(lookup.clone() as Arc<dyn RomanizationLookup>))
        .process_path(&lib.source)
        .await
        .unwrap();

    let organized: Vec<(PathBuf, Option<PathBuf>)> = report
        .results
        .iter()
        .map(|r| (r.source_path.clone(), r.target_path.clone()))
        .collect();
    assert_eq!(organized, planned);
    assert_eq!(lookup.calls(), 1);
    for (_, target) in &organized {
        assert!(target.as_ref().unwrap().exists());
    }
}

#[tokio::test]
async fn test_failed_state_write_rolls_back_batch() {
    let lib = TestLibrary::new();
    lib.add_track("a/1.mp3", track("Queen", "Opera", "One", 1975, 1));
    lib.add_track("a/2.mp3", track("Queen", "Opera", "Two", 1975, 2));
    lib.add_track("a/3.mp3", track("Queen", "Opera", "Three", 1975, 3));
    let pool = lib.pool().await;
    sqlx::query(
        "CREATE TRIGGER fail_second_after BEFORE INSERT ON processing_after
         WHEN (SELECT COUNT(*) FROM processing_after) >= 1
         BEGIN SELECT RAISE(ABORT, 'simulated write failure'); END",
    )
    .execute(&pool)
    .await
    .unwrap();

    let result = lib
        .processor(&pool, false, None)
        .process_path(&lib.source)
        .await;

    assert!(matches!(result, Err(OrganizeError::BatchAborted { .. })));
    assert_eq!(after_count(&pool).await.unwrap(), 0);
    let before: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM processing_before")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(before, 0);
}

#[tokio::test]
async fn test_leftovers_are_quarantined_under_source() {
    let lib = TestLibrary::new();
    lib.add_track("disc/01.mp3", track("Queen", "Opera", "Bohemian", 1975, 1));
    lib.add_file("disc/notes/readme.txt", b"notes");
    // Supported extension, unreadable tags
    lib.add_file("disc/broken.mp3", b"not audio");
    let pool = lib.pool().await;

    let report = lib
        .processor(&pool, false, None)
        .process_path(&lib.source)
        .await
        .unwrap();

    assert_eq!((report.processed, report.failed), (1, 1));
    assert_eq!(report.quarantined.len(), 2);
    assert_eq!(
        list_files(&lib.source),
        vec![
            PathBuf::from("unprocessed/disc/broken.mp3"),
            PathBuf::from("unprocessed/disc/notes/readme.txt"),
        ]
    );
    assert_eq!(list_files(&lib.library).len(), 1);
}

#[tokio::test]
async fn test_single_file_leaves_neighbours_alone() {
    let lib = TestLibrary::new();
    let file = lib.add_track("loose/solo.mp3", track("Queen", "Opera", "Solo", 1975, 3));
    let neighbour = lib.add_file("loose/other.txt", b"x");
    let pool = lib.pool().await;

    let report = lib
        .processor(&pool, false, None)
        .process_path(&file)
        .await
        .unwrap();

    assert_eq!(report.processed, 1);
    assert!(report.quarantined.is_empty());
    assert!(!file.exists());
    assert!(neighbour.exists());
}

#[tokio::test]
async fn test_unsupported_path_is_rejected() {
    let lib = TestLibrary::new();
    let text = lib.add_file("readme.txt", b"x");
    let pool = lib.pool().await;

    let result = lib.processor(&pool, false, None).process_path(&text).await;

    assert!(matches!(result, Err(OrganizeError::NotADirectory(_))));
}

#[tokio::test]
async fn test_same_content_elsewhere_is_skipped_as_duplicate() {
    let lib = TestLibrary::new();
    lib.add_track("a/song.mp3", track("Queen", "Opera", "Bohemian", 1975, 1));
    let pool = lib.pool().await;
    lib.processor(&pool, false, None)
        .process_path(&lib.source)
        .await
        .unwrap();

    let id = generate("Queen");
    let organized = lib
        .library
        .join("Queen")
        .join("1975_Opera")
        .join(format!("01_Bohemian_{}.mp3", id));
    let copy = lib.source.join("b").join("copy.mp3");
    std::fs::create_dir_all(copy.parent().unwrap()).unwrap();
    std::fs::copy(&organized, &copy).unwrap();

    let report = lib
        .processor(&pool, false, None)
        .process_path(&lib.source)
        .await
        .unwrap();

    assert_eq!((report.processed, report.skipped, report.failed), (0, 1, 0));
    assert!(report.results[0].success);
    assert!(report.results[0].skipped_duplicate);
    assert_eq!(report.results[0].target_path.as_ref(), Some(&organized));
    assert!(report.quarantined.is_empty());
    assert!(copy.exists());
    assert_eq!(list_files(&lib.library).len(), 1);
    assert_eq!(after_count(&pool).await.unwrap(), 1);
}

#[tokio::test]
async fn test_retagged_file_is_relocated_within_library() {
    let lib = TestLibrary::new();
    lib.add_track("a/song.mp3", track("Queen", "Opera", "Bohemian", 1975, 1));
    let pool = lib.pool().await;
    lib.processor(&pool, false, None)
        .process_path(&lib.source)
        .await
        .unwrap();

    let id = generate("Queen");
    let old = Path::new("Queen")
        .join("1975_Opera")
        .join(format!("01_Bohemian_{}.mp3", id));
    assert_eq!(list_files(&lib.library), vec![old.clone()]);

    lib.reader.insert(
        "audio:a/song.mp3",
        track("Queen", "Opera Deluxe", "Bohemian", 1975, 1),
    );
    let report = lib
        .processor_into(&pool, &lib.library, false, None)
        .process_path(&lib.library)
        .await
        .unwrap();

    let new = Path::new("Queen")
        .join("1975_Opera-Deluxe")
        .join(format!("01_Bohemian_{}.mp3", id));
    assert_eq!((report.processed, report.skipped, report.failed), (1, 0, 0));
    assert!(!report.results[0].already_organized);
    assert_eq!(report.results[0].target_path, Some(lib.library.join(&new)));
    assert_eq!(list_files(&lib.library), vec![new]);
    assert!(!lib.library.join(&old).exists());
    assert_eq!(after_count(&pool).await.unwrap(), 1);
}

#[tokio::test]
async fn test_artist_id_ignores_album_artist() {
    let lib = TestLibrary::new();
    let mut metadata = track("Queen", "Opera", "Bohemian", 1975, 1);
    metadata.album_artist = metadata.artist.take();
    lib.add_track("a/song.mp3", metadata);
    let pool = lib.pool().await;

    let report = lib
        .processor(&pool, false, None)
        .process_path(&lib.source)
        .await
        .unwrap();

    assert_eq!(report.results[0].artist_id.as_deref(), Some("NOART"));
    assert_eq!(
        list_files(&lib.library),
        vec![PathBuf::from("Queen/1975_Opera/01_Bohemian_NOART.mp3")]
    );
}
