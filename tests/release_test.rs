//! Release driver behaviour against the in-memory release manager

use kompose_chart::compose::config::ServiceConfig;
use kompose_chart::compose::Project;
use kompose_chart::release::{
    Context, HelmSettings, MemoryReleaseManager, Release, ReleaseDriver, StackStatus,
    StackSummary,
};
use kompose_chart::{ChartError, ReleaseManager};

fn driver() -> ReleaseDriver<MemoryReleaseManager> {
    ReleaseDriver::with_settings(MemoryReleaseManager::new("apps"), HelmSettings::default())
}

fn project(name: &str) -> Project {
    Project::new(name).with_service("api", ServiceConfig::with_image("example/api:1.0"))
}

#[tokio::test]
async fn test_uninstall_unknown_release() {
    let driver = driver();
    driver.install(&mut project("web")).await.unwrap();

    let err = driver.uninstall("nonexistent").await.unwrap_err();
    assert!(matches!(err, ChartError::ReleaseNotFound(ref name) if name == "nonexistent"));

    let stacks = driver.list("web").await.unwrap();
    assert_eq!(stacks.len(), 1);
}

#[tokio::test]
async fn test_invalid_project_never_reaches_manager() {
    let driver = driver();
    let mut invalid = Project::new("web").with_service("api", ServiceConfig::default());

    let err = driver.install(&mut invalid).await.unwrap_err();
    assert!(err.is_validation());
    assert_eq!(driver.manager().calls(), 0);
}

#[tokio::test]
async fn test_list_ignores_project_argument() {
    let driver = driver();
    driver.install(&mut project("web")).await.unwrap();
    driver.install(&mut project("shop")).await.unwrap();
    driver
        .manager()
        .insert(Release {
            name: "legacy".to_string(),
            namespace: "apps".to_string(),
            status: "pending-upgrade".to_string(),
            revision: 4,
            updated: None,
            chart: "legacy-1.0.0".to_string(),
        })
        .unwrap();

    let stacks = driver.list("web").await.unwrap();
    let names: Vec<_> = stacks.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["legacy", "shop", "web"]);
    assert_eq!(stacks[0].status, StackStatus::Updating);

    let web = StackSummary::filter_by_project(stacks, "web");
    assert_eq!(web.len(), 1);
    assert_eq!(web[0].status, StackStatus::Running);
}

#[tokio::test]
async fn test_reinstall_bumps_revision() {
    let driver = driver();
    driver.install(&mut project("web")).await.unwrap();
    driver.install(&mut project("web")).await.unwrap();

    let releases = driver.manager().list_releases().await.unwrap();
    assert_eq!(releases[0].revision, 2);
    assert_eq!(releases[0].namespace, "apps");
}

#[tokio::test]
async fn test_cancelled_context_refuses_connect() {
    let driver = driver();
    let ctx = Context::new();
    ctx.cancel();

    assert!(matches!(driver.connect(&ctx).await, Err(ChartError::Cancelled)));
}

#[tokio::test]
async fn test_project_name_is_normalized_for_every_call() {
    let driver = driver();
    driver.install(&mut project("My_App")).await.unwrap();

    let stacks = driver.list("My_App").await.unwrap();
    assert_eq!(stacks[0].name, "my-app");
    assert_eq!(StackSummary::filter_by_project(stacks, "My_App").len(), 1);

    driver.uninstall("My_App").await.unwrap();
    assert!(driver.list("My_App").await.unwrap().is_empty());
}
