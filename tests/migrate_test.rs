mod common;

use std::path::Path;
use std::sync::Arc;

use common::{article, comment, Call, FakeAssets, RecordingGateway};
use qiita2crowi::error::{GatewayError, MigrationError};
use qiita2crowi::migrate::{ArticleMigrator, MigrationOutcome, Stage, COMMENTS_HEADER};

const WORK_DIR: &str = "/tmp/qiita-assets";

fn migrator(gateway: &RecordingGateway, assets: &FakeAssets) -> ArticleMigrator {
    ArticleMigrator::new(
        Arc::new(gateway.clone()),
        Arc::new(assets.clone()),
        "/qiita",
        WORK_DIR,
    )
}

fn failed(outcome: MigrationOutcome) -> (Stage, MigrationError) {
    match outcome {
        MigrationOutcome::Failed { stage, reason } => (stage, reason),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn image_is_relocated_and_body_rewritten() {
    let gateway = RecordingGateway::new();
    let assets = FakeAssets::new();
    let a = article(
        "Hello/World",
        "![a](https://team.qiita.com/files/a.png)",
        r#"<p><img src="https://team.qiita.com/files/a.png" alt="a"></p>"#,
    );

    let outcome = migrator(&gateway, &assets).migrate(&a, "k1").await;
    match outcome {
        MigrationOutcome::Succeeded {
            page_id,
            relocated_images,
        } => {
            assert_eq!(page_id, "/qiita/Hello／World");
            assert_eq!(relocated_images, 1);
        }
        other => panic!("unexpected {:?}", other),
    }

    let calls = gateway.calls().await;
    assert_eq!(calls.len(), 3, "{:?}", calls);
    let header = "<!-- Imported by\nteam.qiita.com/alice/items/11\n-->\n\n";
    assert_eq!(
        calls[0],
        Call::Create {
            path: "/qiita/Hello／World".into(),
            body: format!("{}![a](https://team.qiita.com/files/a.png)", header),
        }
    );
    assert_eq!(
        calls[1],
        Call::Attach {
            page_id: "/qiita/Hello／World".into(),
            file: Path::new(WORK_DIR).join("k1").join("a.png"),
        }
    );
    assert_eq!(
        calls[2],
        Call::Update {
            page_id: "/qiita/Hello／World".into(),
            body: format!("{}![a](/files/a.png)", header),
        }
    );

    let fetched = assets.fetched().await;
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].1, Path::new(WORK_DIR).join("k1"));
}

#[tokio::test]
async fn comments_are_appended_in_one_update() {
    let gateway = RecordingGateway::new();
    let mut a = article("Notes", "body text\n", "<p>body text</p>");
    a.comments = vec![comment("alice", "first!"), comment("bob", "second")];

    let outcome = migrator(&gateway, &FakeAssets::new()).migrate(&a, "k").await;
    assert!(outcome.is_success());

    let calls = gateway.calls().await;
    assert_eq!(calls.len(), 2);
    match &calls[1] {
        Call::Update { body, .. } => {
            let expected_tail = format!("body text\n{}## alice\nfirst!\n## bob\nsecond\n", COMMENTS_HEADER);
            assert!(body.ends_with(&expected_tail), "{}", body);
            assert_eq!(body.matches(COMMENTS_HEADER).count(), 1);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn plain_article_is_a_single_create() {
    let gateway = RecordingGateway::new();
    let a = article("Plain", "just text", "<p>just text</p>");

    let outcome = migrator(&gateway, &FakeAssets::new()).migrate(&a, "k").await;
    assert!(outcome.is_success());

    let calls = gateway.calls().await;
    assert_eq!(
        calls,
        vec![Call::Create {
            path: "/qiita/Plain".into(),
            body: "<!-- Imported by\nteam.qiita.com/alice/items/5\n-->\n\njust text".into(),
        }]
    );
}

#[tokio::test]
async fn rejected_create_stops_the_article() {
    let gateway = RecordingGateway::new().rejecting_create(&["/qiita/Taken"]);
    let assets = FakeAssets::new();
    let mut a = article("Taken", "x", r#"<img src="https://h.example/a.png">"#);
    a.comments = vec![comment("alice", "hi")];

    let (stage, reason) = failed(migrator(&gateway, &assets).migrate(&a, "k").await);
    assert_eq!(stage, Stage::Create);
    assert!(matches!(
        reason,
        MigrationError::Gateway(GatewayError::Rejected { .. })
    ));
    assert_eq!(gateway.calls().await.len(), 1);
    assert!(assets.fetched().await.is_empty());
}

#[tokio::test]
async fn dot_title_is_rejected_before_any_call() {
    let gateway = RecordingGateway::new();
    let (stage, reason) = failed(
        migrator(&gateway, &FakeAssets::new())
            .migrate(&article("..", "x", ""), "k")
            .await,
    );
    assert_eq!(stage, Stage::Create);
    assert!(matches!(reason, MigrationError::InvalidPath { .. }));
    assert!(gateway.calls().await.is_empty());
}

#[tokio::test]
async fn missing_image_fails_relocation() {
    let gateway = RecordingGateway::new();
    let assets = FakeAssets::missing(&["https://h.example/gone.png"]);
    let mut a = article("Gone", "x", r#"<img src="https://h.example/gone.png">"#);
    a.comments = vec![comment("alice", "hi")];

    let (stage, reason) = failed(migrator(&gateway, &assets).migrate(&a, "k").await);
    assert_eq!(stage, Stage::RelocateImages);
    assert!(matches!(reason, MigrationError::Fetch(_)));

    let calls = gateway.calls().await;
    assert_eq!(calls.len(), 1);
    assert!(matches!(calls[0], Call::Create { .. }));
}

#[tokio::test]
async fn attachment_rejection_leaves_page_unrewritten() {
    let gateway = RecordingGateway::new().with_attachment_responses(vec![
        Ok("/files/one.png".into()),
        Err(GatewayError::MissingField {
            operation: "attachments.add",
            field: "filename",
        }),
    ]);
    let rendered = r#"<img src="https://h.example/one.png"><img src="https://h.example/two.png">"#;
    let a = article("Two", "one two", rendered);

    let (stage, _) = failed(migrator(&gateway, &FakeAssets::new()).migrate(&a, "k").await);
    assert_eq!(stage, Stage::RelocateImages);

    let calls = gateway.calls().await;
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|c| !matches!(c, Call::Update { .. })));
}

#[tokio::test]
async fn failed_rewrite_skips_comments() {
    let gateway = RecordingGateway::new().with_update_script(vec![true]);
    let mut a = article(
        "Rewrite",
        "https://h.example/a.png",
        r#"<img src="https://h.example/a.png">"#,
    );
    a.comments = vec![comment("alice", "hi")];

    let (stage, _) = failed(migrator(&gateway, &FakeAssets::new()).migrate(&a, "k").await);
    assert_eq!(stage, Stage::RewriteBody);

    let updates: Vec<_> = gateway
        .calls()
        .await
        .into_iter()
        .filter(|c| matches!(c, Call::Update { .. }))
        .collect();
    assert_eq!(updates.len(), 1);
}

#[tokio::test]
async fn failed_comment_update_is_reported_at_its_stage() {
    let gateway = RecordingGateway::new().with_update_script(vec![false, true]);
    let mut a = article(
        "Thread",
        "https://h.example/a.png",
        r#"<img src="https://h.example/a.png">"#,
    );
    a.comments = vec![comment("bob", "hello")];

    let (stage, _) = failed(migrator(&gateway, &FakeAssets::new()).migrate(&a, "k").await);
    assert_eq!(stage, Stage::AppendComments);

    // The comment update carries the rewritten links as well.
    match gateway.calls().await.last() {
        Some(Call::Update { body, .. }) => {
            assert!(body.contains("/files/a.png"));
            assert!(!body.contains("https://h.example/a.png"));
            assert!(body.ends_with("## bob\nhello\n"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn repeated_image_is_relocated_per_occurrence() {
    let gateway = RecordingGateway::new();
    let assets = FakeAssets::new();
    let rendered = r#"<img src="https://h.example/a.png"><img src="https://h.example/a.png">"#;
    let a = article("Twice", "https://h.example/a.png and again https://h.example/a.png", rendered);

    let outcome = migrator(&gateway, &assets).migrate(&a, "k").await;
    assert!(outcome.is_success());
    assert_eq!(assets.fetched().await.len(), 2);

    let calls = gateway.calls().await;
    let attaches = calls.iter().filter(|c| matches!(c, Call::Attach { .. })).count();
    assert_eq!(attaches, 2);
    match calls.last() {
        Some(Call::Update { body, .. }) => {
            assert!(body.ends_with("/files/a.png and again /files/a.png"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn escaped_query_in_src_matches_markdown_link() {
    let gateway = RecordingGateway::new();
    let assets = FakeAssets::new();
    let a = article(
        "Query",
        "![q](https://h.example/img?id=1&size=large)",
        r#"<img src="https://h.example/img?id=1&amp;size=large">"#,
    );

    let outcome = migrator(&gateway, &assets).migrate(&a, "k").await;
    assert!(outcome.is_success());

    let fetched = assets.fetched().await;
    assert_eq!(fetched[0].0, "https://h.example/img?id=1&size=large");
    match gateway.calls().await.last() {
        Some(Call::Update { body, .. }) => {
            assert!(!body.contains("https://h.example/img"), "{}", body);
            assert!(body.ends_with("![q](/files/img?id=1&size=large)"));
        }
        other => panic!("unexpected {:?}", other),
    }
}
