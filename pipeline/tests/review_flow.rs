//! Preview, pull request creation and update, and branch listing.

use std::thread;
use std::time::Duration;

use pipeline::review::{
    PrRequest, PrUpdateRequest, create_pull_request, list_branches, preview_pull_request,
    update_pull_request,
};
use pipeline::test_support::{Harness, RecordingHost, ScriptedCompletion, TestRepo};

fn repo_with_feature() -> TestRepo {
    let repo = TestRepo::new();
    repo.commit_file("app.py", "print('bye')\n", "app");
    repo.git().checkout_new_branch("feature/carol/hello").expect("branch");
    repo.commit_file("app.py", "print('hello')\n", "hello");
    repo.commit_file("docs/readme.txt", "hi\n", "docs");
    repo
}

#[test]
fn preview_lists_changed_files_and_never_opens_a_pr() {
    let repo = repo_with_feature();
    let harness = Harness::new(ScriptedCompletion::new(["Say hello\n\nDetails"]))
        .with_host(RecordingHost::new());
    let request = PrRequest {
        repo_path: repo.path().display().to_string(),
        source_branch: "feature/carol/hello".to_string(),
        target_branch: "main".to_string(),
        title: "Say hello".to_string(),
        description: "Greets instead of leaving".to_string(),
    };

    let preview = preview_pull_request(&harness.ctx(), &request).expect("preview");

    assert!(preview.pr_url.is_none());
    assert_eq!(preview.pr_content, "Say hello\n\nDetails");
    let files: Vec<(&str, &str)> = preview
        .diff_files
        .iter()
        .map(|f| (f.path.as_str(), f.status.as_str()))
        .collect();
    assert_eq!(files, vec![("app.py", "modified"), ("docs/readme.txt", "added")]);
    assert!(preview.diff_files[0].diff.contains("+print('hello')"));

    let requests = harness.completion.requests();
    let prompt = &requests[0].user;
    assert!(prompt.contains("Title: Say hello\n\nDescription: Greets instead of leaving"));
    assert!(prompt.contains("Files changed:\n- app.py (modified)\n- docs/readme.txt (added)"));
    assert!(harness.host().created().is_empty());
}

#[test]
fn preview_of_unknown_branch_is_a_branch_error() {
    let repo = repo_with_feature();
    let harness = Harness::new(ScriptedCompletion::new(["unused"]));
    let request = PrRequest {
        repo_path: repo.path().display().to_string(),
        source_branch: "feature/nobody/missing".to_string(),
        target_branch: "main".to_string(),
        title: "t".to_string(),
        description: String::new(),
    };

    let err = preview_pull_request(&harness.ctx(), &request).expect_err("missing branch");
    assert_eq!(err.kind(), "branch_operation");
    assert!(err.to_string().contains("feature/nobody/missing"));
}

fn create_request(repo: &TestRepo, source: &str, title: &str) -> PrRequest {
    PrRequest {
        repo_path: repo.path().display().to_string(),
        source_branch: source.to_string(),
        target_branch: "main".to_string(),
        title: title.to_string(),
        description: "Greets instead of leaving".to_string(),
    }
}

#[test]
fn create_pushes_the_branch_and_opens_a_draft() {
    let repo = repo_with_feature();
    let remote = repo.add_bare_remote("origin");
    let harness = Harness::new(ScriptedCompletion::new(["Say hello\n\nDetails"]))
        .with_host(RecordingHost::new());
    let head_before = repo.git().head_sha().expect("sha");

    let created = create_pull_request(
        &harness.ctx(),
        &create_request(&repo, "feature/carol/hello", "Greeting"),
    )
    .expect("create");

    assert!(remote.has_branch("feature/carol/hello"));
    let opened = harness.host().created();
    assert_eq!(opened.len(), 1);
    let (slug, pr) = &opened[0];
    assert_eq!(pr.title, "Greeting");
    assert_eq!(pr.body, "Say hello\n\nDetails");
    assert_eq!((pr.head.as_str(), pr.base.as_str()), ("feature/carol/hello", "main"));
    assert!(pr.draft);
    assert_eq!(
        created.pr_url,
        format!("https://github.com/{}/{}/pull/1", slug.owner, slug.name)
    );
    assert_eq!(created.pr_content, "Say hello\n\nDetails");
    assert_eq!(created.diff_files.len(), 2);
    assert_eq!(repo.git().head_sha().expect("sha"), head_before);
    assert_eq!(repo.last_commit_message(), "docs");
}

#[test]
fn create_with_blank_title_uses_the_synthesized_one() {
    let repo = repo_with_feature();
    let _remote = repo.add_bare_remote("origin");
    let harness = Harness::new(ScriptedCompletion::new(["Say hello\n\nDetails"]))
        .with_host(RecordingHost::new());

    let created = create_pull_request(
        &harness.ctx(),
        &create_request(&repo, "feature/carol/hello", "  "),
    )
    .expect("create");

    assert_eq!(created.title, "Say hello");
    assert_eq!(harness.host().created()[0].1.title, "Say hello");
}

#[test]
fn create_without_new_commits_is_a_branch_error() {
    let repo = repo_with_feature();
    let _remote = repo.add_bare_remote("origin");
    repo.git().checkout_branch("main").expect("checkout");
    repo.git().checkout_new_branch("feature/carol/empty").expect("branch");
    let harness = Harness::new(ScriptedCompletion::new(["Nothing"]))
        .with_host(RecordingHost::new());

    let err = create_pull_request(
        &harness.ctx(),
        &create_request(&repo, "feature/carol/empty", "Empty"),
    )
    .expect_err("nothing to propose");

    assert_eq!(err.kind(), "branch_operation");
    assert!(err.to_string().contains("no commits over main"));
    assert!(harness.host().created().is_empty());
}

#[test]
fn create_without_remote_is_a_hosting_error() {
    let repo = repo_with_feature();
    let harness = Harness::new(ScriptedCompletion::new(["Say hello"]))
        .with_host(RecordingHost::new());

    let err = create_pull_request(
        &harness.ctx(),
        &create_request(&repo, "feature/carol/hello", "Greeting"),
    )
    .expect_err("no remote");

    assert_eq!(err.kind(), "pr_hosting");
    assert!(err.to_string().contains("origin"));
    assert!(harness.host().created().is_empty());
}

#[test]
fn create_without_hosting_token_is_a_hosting_error() {
    let repo = repo_with_feature();
    let remote = repo.add_bare_remote("origin");
    let harness = Harness::new(ScriptedCompletion::new(["Say hello"]));

    let err = create_pull_request(
        &harness.ctx(),
        &create_request(&repo, "feature/carol/hello", "Greeting"),
    )
    .expect_err("no token");

    assert_eq!(err.kind(), "pr_hosting");
    assert!(err.to_string().contains("hosting token not configured"));
    assert!(remote.has_branch("feature/carol/hello"));
}

#[test]
fn update_requires_a_pull_request_url() {
    let harness = Harness::new(ScriptedCompletion::new(Vec::<String>::new()))
        .with_host(RecordingHost::new());
    let request = PrUpdateRequest {
        pr_url: "https://github.com/acme/widgets/issues/9".to_string(),
        title: "t".to_string(),
        body: "b".to_string(),
    };

    let err = update_pull_request(&harness.ctx(), &request).expect_err("invalid url");
    assert_eq!(err.kind(), "pr_hosting");
    assert!(err.to_string().ends_with("Invalid PR URL"));
    assert!(harness.host().updated().is_empty());
}

#[test]
fn update_replaces_title_and_body_wholesale() {
    let harness = Harness::new(ScriptedCompletion::new(Vec::<String>::new()))
        .with_host(RecordingHost::new());
    let request = PrUpdateRequest {
        pr_url: "https://github.com/acme/widgets/pull/12#discussion".to_string(),
        title: "New title".to_string(),
        body: "New body".to_string(),
    };

    update_pull_request(&harness.ctx(), &request).expect("update");

    let updated = harness.host().updated();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].0.owner, "acme");
    assert_eq!(updated[0].0.repo, "widgets");
    assert_eq!(updated[0].0.number, 12);
    assert_eq!((updated[0].1.as_str(), updated[0].2.as_str()), ("New title", "New body"));
}

#[test]
fn update_without_hosting_token_fails() {
    let harness = Harness::new(ScriptedCompletion::new(Vec::<String>::new()));
    let request = PrUpdateRequest {
        pr_url: "https://github.com/acme/widgets/pull/12".to_string(),
        title: "t".to_string(),
        body: "b".to_string(),
    };
    let err = update_pull_request(&harness.ctx(), &request).expect_err("no host");
    assert_eq!(err.kind(), "pr_hosting");
}

#[test]
fn branch_listing_marks_the_current_branch() {
    let repo = repo_with_feature();
    let harness = Harness::new(ScriptedCompletion::new(Vec::<String>::new()));

    let branches = list_branches(&harness.ctx(), repo.path()).expect("branches");

    assert_eq!(branches.len(), 2);
    let feature = &branches[0];
    assert_eq!(feature.name, "feature/carol/hello");
    assert!(feature.is_current);
    assert_eq!(feature.last_commit.len(), 7);
    assert!(feature.last_commit_date.contains('T'));
    assert_eq!(branches[1].name, "main");
    assert!(!branches[1].is_current);
}

#[test]
fn branch_listing_of_plain_directory_is_a_repo_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let harness = Harness::new(ScriptedCompletion::new(Vec::<String>::new()));
    let err = list_branches(&harness.ctx(), temp.path()).expect_err("not a repo");
    assert_eq!(err.kind(), "repo_access");
}

#[test]
fn branch_listing_waits_for_the_repository_lease() {
    let repo = repo_with_feature();
    let harness = Harness::new(ScriptedCompletion::new(Vec::<String>::new()));
    let ctx = harness.ctx();

    let lease = harness.leases.acquire(repo.path());
    thread::scope(|scope| {
        let listing = scope.spawn(|| list_branches(&ctx, repo.path()));
        thread::sleep(Duration::from_millis(150));
        assert!(!listing.is_finished());
        drop(lease);
        let branches = listing.join().expect("join").expect("branches");
        assert_eq!(branches.len(), 2);
    });
}
