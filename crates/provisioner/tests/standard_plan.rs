//! The full travel agents plan against an in-memory cloud.

mod common;

use common::FakeCloud;
use provisioner::plan;
use provisioner::report::{SkipReason, StepOutcome};
use provisioner::resource::{ResourceKind, ResourceReference};

#[tokio::test(start_paused = true)]
async fn test_full_plan_converges_then_skips() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = common::context("demo-project", dir.path());
    let fake = FakeCloud::new();
    let reconciler = plan::standard_plan(&ctx, &fake.backends()).unwrap();

    let first = reconciler.run(&ctx).await;
    assert!(first.is_success(), "{}", first.render_summary());
    assert_eq!(first.entries.len(), reconciler.len());
    assert_eq!(first.count("applied"), reconciler.len());

    assert!(ctx.credentials_path().exists());
    assert!(ctx.variables_path().exists());
    assert_eq!(fake.keys_created(), 1);
    assert_eq!(fake.manifest_applies(), 1);
    assert_eq!(
        fake.pushes(),
        vec![
            "us-central1-docker.pkg.dev/demo-project/travel-agents/travel-adk-coordinator:latest"
                .to_string()
        ]
    );
    assert!(fake.has(&ResourceReference::namespaced(
        ResourceKind::Secret,
        "adk-travel",
        "travel-agents-sa-key"
    )));

    let key_before = std::fs::read(ctx.credentials_path()).unwrap();
    let second = reconciler.run(&ctx).await;
    assert!(second.is_success());
    for entry in &second.entries {
        if entry.step == "wait-rollout" {
            assert_eq!(entry.outcome, StepOutcome::Applied);
        } else {
            assert_eq!(
                entry.outcome,
                StepOutcome::Skipped {
                    reason: SkipReason::AlreadySatisfied
                },
                "{} should be skipped on a converged target",
                entry.step
            );
        }
    }

    assert_eq!(fake.keys_created(), 1);
    assert_eq!(fake.manifest_applies(), 1);
    assert_eq!(fake.pushes().len(), 1);
    assert_eq!(std::fs::read(ctx.credentials_path()).unwrap(), key_before);
}

#[tokio::test(start_paused = true)]
async fn test_unready_rollout_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = common::context("demo-project", dir.path());
    let fake = FakeCloud::new();
    fake.ready_after(u32::MAX);

    let report = plan::standard_plan(&ctx, &fake.backends())
        .unwrap()
        .run(&ctx)
        .await;

    assert_eq!(report.failed_step().unwrap().step, "wait-rollout");
    assert!(report.not_attempted.is_empty());
    // 30s timeout at a 5s interval
    assert_eq!(fake.rollout_polls(), 6);
    assert!(report.render_summary().contains("wait-rollout"));
}

#[tokio::test(start_paused = true)]
async fn test_existing_variables_file_is_left_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = common::context("demo-project", dir.path());
    std::fs::write(ctx.variables_path(), "# managed elsewhere\n").unwrap();
    let fake = FakeCloud::new();

    let report = plan::standard_plan(&ctx, &fake.backends())
        .unwrap()
        .run(&ctx)
        .await;

    assert!(report.is_success());
    assert_eq!(
        report.entry("write-variables").unwrap().outcome,
        StepOutcome::Skipped {
            reason: SkipReason::AlreadySatisfied
        }
    );
    assert_eq!(
        std::fs::read_to_string(ctx.variables_path()).unwrap(),
        "# managed elsewhere\n"
    );
}

#[tokio::test(start_paused = true)]
async fn test_report_serializes_to_json() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = common::context("demo-project", dir.path());
    let fake = FakeCloud::new();

    let report = plan::standard_plan(&ctx, &fake.backends())
        .unwrap()
        .run(&ctx)
        .await;

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["target"], "demo-project/us-central1/travel-agents-cluster");
    assert_eq!(json["entries"][0]["step"], "enable-apis");
    assert_eq!(json["entries"][0]["outcome"]["status"], "applied");
}
