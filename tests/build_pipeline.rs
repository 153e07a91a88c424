//! End-to-end builds through the public API.
//!
//! Each test works on its own temp directory: either a copy of `fixtures/`
//! or content written inline.

use folio::build::{Build, BuildEvent, BuildState, ErrorKind};
use folio::config::SiteConfig;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tempfile::TempDir;
use walkdir::WalkDir;

fn config_in(root: &Path) -> SiteConfig {
    SiteConfig {
        content_dir: root.join("content"),
        output_dir: root.join("www"),
        temp_dir: root.join(".folio-tmp"),
        template_dir: root.join("templates"),
        ..SiteConfig::default()
    }
}

fn copy_fixtures(dst: &Path) {
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures");
    for entry in WalkDir::new(&fixtures) {
        let entry = entry.unwrap();
        let target = dst.join(entry.path().strip_prefix(&fixtures).unwrap());
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).unwrap();
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn read(root: &Path, relative: &str) -> String {
    fs::read_to_string(root.join(relative))
        .unwrap_or_else(|e| panic!("reading {relative}: {e}"))
}

/// Relative path → bytes for every file under `dir`.
fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(dir)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e.path().strip_prefix(dir).unwrap().to_path_buf();
            (relative, fs::read(e.path()).unwrap())
        })
        .collect()
}

// =========================================================================
// Fixture site
// =========================================================================

#[test]
fn fixture_site_builds() {
    let tmp = TempDir::new().unwrap();
    copy_fixtures(tmp.path());
    let mut config = config_in(tmp.path());
    config.index = vec!["tags".to_string()];

    let summary = Build::from_config(config.clone()).unwrap().run().unwrap();
    let www = &config.output_dir;

    assert_eq!(summary.copied, 1);
    assert_eq!(summary.skipped_drafts, 1);
    // index ×2, about, tags ×3 (one per term), three posts
    assert_eq!(summary.rendered, 9);
    assert!(!config.temp_dir.exists());

    for page in [
        "index.html",
        "index2.html",
        "about.html",
        "blog/first-post.html",
        "blog/second-post.html",
        "blog/third_post.html",
        "tags-notes.html",
        "tags-rust.html",
        "tags-web.html",
    ] {
        assert!(www.join(page).is_file(), "missing {page}");
    }
    assert!(!www.join("blog/wip.html").exists());
    assert!(!www.join("tags-secret.html").exists());
    assert!(!www.join("tags.html").exists());
}

#[test]
fn fixture_listing_is_newest_first_across_pages() {
    let tmp = TempDir::new().unwrap();
    copy_fixtures(tmp.path());
    let mut config = config_in(tmp.path());
    config.index = vec!["tags".to_string()];
    Build::from_config(config.clone()).unwrap().run().unwrap();
    let www = &config.output_dir;

    let first = read(www, "index.html");
    assert!(first.contains("This site has 6 published pages."));
    let third = first.find("third post").expect("newest post on page 1");
    let second = first.find("Second Post").expect("second post on page 1");
    assert!(third < second);
    assert!(!first.contains("First Post"));
    assert!(first.contains(r#"rel="next" href="/index2.html""#));

    let last = read(www, "index2.html");
    assert!(last.contains("<title>Home - page 2 of 2</title>"));
    assert!(last.contains("First Post"));
    assert!(last.contains(r#"rel="prev" href="/""#));
}

#[test]
fn fixture_templates_and_term_pages_render() {
    let tmp = TempDir::new().unwrap();
    copy_fixtures(tmp.path());
    let mut config = config_in(tmp.path());
    config.index = vec!["tags".to_string()];
    Build::from_config(config.clone()).unwrap().run().unwrap();
    let www = &config.output_dir;

    let post = read(www, "blog/first-post.html");
    assert!(post.contains(r#"<article class="post">"#));
    assert!(post.contains("<em>first</em>"));
    assert!(post.contains("rust, web"));

    assert!(read(www, "blog/third_post.html").contains("<table>"));

    let rust = read(www, "tags-rust.html");
    assert!(rust.contains("<title>Tagged rust</title>"));
    assert!(rust.contains("/blog/first-post.html"));
    assert!(rust.contains("/blog/second-post.html"));
    assert!(rust.contains(r#"<a href="/tags-web.html">web</a>"#));
}

#[test]
fn assets_are_copied_byte_for_byte() {
    let tmp = TempDir::new().unwrap();
    copy_fixtures(tmp.path());
    let mut config = config_in(tmp.path());
    config.index = vec!["tags".to_string()];
    Build::from_config(config.clone()).unwrap().run().unwrap();

    let source = fs::read(config.content_dir.join("img/logo.png")).unwrap();
    assert!(source.starts_with(b"\x89PNG\r\n\x1a\n"));
    assert!(std::str::from_utf8(&source).is_err());
    let copied = fs::read(config.output_dir.join("img/logo.png")).unwrap();
    assert_eq!(source, copied);
}

// =========================================================================
// Pagination
// =========================================================================

#[test]
fn forty_five_pages_paginate_into_three() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(tmp.path());
    write(
        &config.content_dir,
        "index.md",
        "---\ntitle: Archive\npagination:\n  data: pages\n  per_page: 20\n---\n",
    );
    for day in 1..=45 {
        write(
            &config.content_dir,
            &format!("posts/post-{day:02}.md"),
            &format!("---\ntitle: Post {day}\ndate: 1700{day:06}\n---\nBody {day}"),
        );
    }

    let summary = Build::from_config(config.clone()).unwrap().run().unwrap();
    let www = &config.output_dir;

    // 45 posts + 3 archive pages
    assert_eq!(summary.rendered, 48);
    assert!(www.join("index.html").is_file());
    assert!(www.join("index2.html").is_file());
    assert!(www.join("index3.html").is_file());
    assert!(!www.join("index4.html").exists());

    let middle = read(www, "index2.html");
    assert!(middle.contains("Archive - page 2 of 3"));
    assert!(middle.contains(r#"rel="prev" href="/""#));
    assert!(middle.contains(r#"rel="next" href="/index3.html""#));

    let last = read(www, "index3.html");
    assert_eq!(last.matches("<li>").count(), 5);
    assert!(!last.contains(r#"rel="next""#));
}

// =========================================================================
// Drafts
// =========================================================================

#[test]
fn drafts_produce_no_output_and_no_listing() {
    let tmp = TempDir::new().unwrap();
    let mut config = config_in(tmp.path());
    config.index = vec!["tags".to_string()];
    write(
        &config.content_dir,
        "draft.md",
        "---\ntitle: Secret Draft\ndraft: true\ntags: [hush]\n---\nshh",
    );
    write(
        &config.content_dir,
        "index.md",
        "{% for path, page in pages %}[{{ page.meta.title }}]{% endfor %}\n\n\
         {% for term, paths in index.tags %}<{{ term }}>{% endfor %}",
    );

    let summary = Build::from_config(config.clone()).unwrap().run().unwrap();

    assert_eq!(summary.skipped_drafts, 1);
    assert!(!config.output_dir.join("draft.html").exists());
    let index = read(&config.output_dir, "index.html");
    assert!(!index.contains("Secret Draft"));
    assert!(!index.contains("hush"));
}

// =========================================================================
// Failure handling
// =========================================================================

#[test]
fn failed_build_leaves_previous_output_untouched() {
    let tmp = TempDir::new().unwrap();
    copy_fixtures(tmp.path());
    let mut config = config_in(tmp.path());
    config.index = vec!["tags".to_string()];
    Build::from_config(config.clone()).unwrap().run().unwrap();
    let before = snapshot(&config.output_dir);
    assert!(!before.is_empty());

    write(&config.content_dir, "broken.md", "Hello {{ no_such_variable }}");
    write(&config.content_dir, "new-asset.txt", "would be copied first");

    let (tx, rx) = mpsc::channel();
    let mut build = Build::from_config(config.clone()).unwrap().with_events(tx);
    let err = build.run().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Template);
    assert_eq!(build.state(), BuildState::Failed);
    drop(build);

    assert_eq!(snapshot(&config.output_dir), before);
    assert!(!config.temp_dir.exists());

    let events: Vec<BuildEvent> = rx.iter().collect();
    assert!(events.iter().any(|e| matches!(
        e,
        BuildEvent::StateChanged {
            to: BuildState::Cleanup,
            ..
        }
    )));
    assert!(!events.iter().any(|e| matches!(e, BuildEvent::Published { .. })));
}

#[test]
fn unparseable_date_fails_before_rendering() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(tmp.path());
    write(&config.content_dir, "ok.md", "fine");
    write(&config.content_dir, "bad.md", "---\ndate: the other day\n---\nx");

    let (tx, rx) = mpsc::channel();
    let err = Build::from_config(config.clone())
        .unwrap()
        .with_events(tx)
        .run()
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Parse);
    assert!(err.to_string().contains("the other day"));
    assert!(!config.output_dir.exists());
    let events: Vec<BuildEvent> = rx.iter().collect();
    assert!(!events.iter().any(|e| matches!(e, BuildEvent::Rendered { .. })));
}
