mod common;

use browser_pilot::brain::parse_reply;
use browser_pilot::{Action, Agent, AgentConfig, Decision, RunStatus};
use common::{FakeBrowser, FakeElement, ScriptedBrain, decision, quiet_config};
use serde_json::json;
use std::sync::atomic::Ordering;

fn page() -> FakeBrowser {
    let mut browser = FakeBrowser::new()
        .with_element("#search", FakeElement::text(""))
        .with_element("h1", FakeElement::text("Example Domain"))
        .with_element(
            "a.more",
            FakeElement::text("More information...").attr("href", "https://www.iana.org/domains/example"),
        );
    browser.title = "Example Domain".into();
    browser.url = "https://example.com/".into();
    browser
}

fn steps_of(outcome: &browser_pilot::RunOutcome) -> Vec<usize> {
    outcome.history.iter().map(|e| e.step).collect()
}

#[tokio::test]
async fn done_on_step_n_succeeds_with_its_result() {
    let brain = ScriptedBrain::new(vec![
        decision("type", json!({"selector": "#search", "text": "rust"})),
        decision("scroll", json!({"direction": "down"})),
        decision("done", json!({"result": "Found the Rust homepage"})),
    ]);
    let mut agent = Agent::new(page(), brain, quiet_config(10)).unwrap();

    let outcome = agent.run("Search for rust", None).await;

    assert!(outcome.success);
    assert_eq!(outcome.status, RunStatus::Succeeded);
    assert_eq!(outcome.steps, 3);
    assert_eq!(outcome.message, "Found the Rust homepage");
    assert_eq!(steps_of(&outcome), vec![1, 2, 3]);
}

#[tokio::test]
async fn impossible_fails_with_its_result() {
    let brain = ScriptedBrain::new(vec![
        decision("extract", json!({"selector": "h1"})),
        decision("impossible", json!({"result": "This site does not sell pizza"})),
    ]);
    let mut agent = Agent::new(page(), brain, quiet_config(10)).unwrap();

    let outcome = agent.run("Order a pizza", None).await;

    assert!(!outcome.success);
    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.steps, 2);
    assert_eq!(outcome.message, "This site does not sell pizza");
    assert_eq!(outcome.history.len(), 2);
}

#[tokio::test]
async fn running_out_of_steps_names_the_budget() {
    let brain = ScriptedBrain::repeating(decision("scroll", json!({"direction": "down"})));
    let mut agent = Agent::new(page(), brain, quiet_config(4)).unwrap();

    let outcome = agent.run("Scroll forever", None).await;

    assert!(!outcome.success);
    assert_eq!(outcome.status, RunStatus::Exhausted);
    assert_eq!(outcome.steps, 4);
    assert!(outcome.message.contains("maximum number of steps (4)"));
    assert_eq!(steps_of(&outcome), vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn two_failures_in_a_row_abort_the_run() {
    let brain = ScriptedBrain::repeating(decision("click", json!({"selector": "#gone"})));
    let mut agent = Agent::new(page(), brain, quiet_config(10)).unwrap();

    let outcome = agent.run("Click the missing button", None).await;

    assert!(!outcome.success);
    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.steps, 2);
    assert!(outcome.message.contains("Multiple errors in a row"));
    assert!(outcome.message.contains("element '#gone' not found"));
    assert_eq!(outcome.history.len(), 2);
    assert!(outcome.history.iter().all(|e| !e.result.success));
}

#[tokio::test]
async fn a_single_failure_is_tolerated() {
    let brain = ScriptedBrain::new(vec![
        decision("click", json!({"selector": "#gone"})),
        decision("click", json!({"selector": "a.more"})),
        decision("click", json!({"selector": "#gone"})),
        decision("done", json!({"result": "ok"})),
    ]);
    let mut agent = Agent::new(page(), brain, quiet_config(10)).unwrap();

    let outcome = agent.run("Recover from a flaky selector", None).await;

    assert!(outcome.success);
    assert_eq!(outcome.steps, 4);
}

#[tokio::test]
async fn unknown_actions_are_skipped_without_counting_as_failures() {
    let brain = ScriptedBrain::new(vec![
        decision("hover", json!({"selector": "h1"})),
        decision("click", json!({"selector": "h1"})),
        decision("hover", json!({"selector": "h1"})),
        decision("click", json!({"selector": "h1"})),
        decision("hover", json!({"selector": "h1"})),
        decision("done", json!({"result": "finished"})),
    ]);
    let mut agent = Agent::new(page(), brain, quiet_config(6)).unwrap();

    let outcome = agent.run("Alternate bad and good suggestions", None).await;

    assert!(outcome.success);
    assert_eq!(outcome.steps, 6);
    assert_eq!(steps_of(&outcome), vec![1, 2, 3]);
}

#[tokio::test]
async fn unknown_actions_never_reach_the_browser() {
    let browser = page();
    let executed = browser.executed.clone();
    let brain = ScriptedBrain::repeating(decision("teleport", json!({"to": "mars"})));
    let mut agent = Agent::new(browser, brain, quiet_config(3)).unwrap();

    let outcome = agent.run("Go to mars", None).await;

    assert_eq!(outcome.status, RunStatus::Exhausted);
    assert!(outcome.history.is_empty());
    assert!(executed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn a_model_answering_error_is_skipped_not_counted() {
    let literal_error =
        parse_reply(r#"{"action": {"action_type": "error", "parameters": {}}, "reasoning": "?"}"#)
            .unwrap();
    let brain = ScriptedBrain::new(vec![
        decision("click", json!({"selector": "#gone"})),
        literal_error,
        decision("done", json!({"result": "finished anyway"})),
    ]);
    let mut agent = Agent::new(page(), brain, quiet_config(10)).unwrap();

    let outcome = agent.run("Survive an odd reply", None).await;

    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(outcome.steps, 3);
    assert_eq!(outcome.message, "finished anyway");
    assert_eq!(steps_of(&outcome), vec![1, 2]);
}

#[tokio::test]
async fn malformed_parameters_are_skipped() {
    let brain = ScriptedBrain::new(vec![
        decision("click", json!({})),
        decision("scroll", json!({"direction": "diagonal"})),
        decision("wait", json!({"seconds": -3})),
        decision("done", json!({"result": "ok"})),
    ]);
    let mut agent = Agent::new(page(), brain, quiet_config(10)).unwrap();

    let outcome = agent.run("Survive sloppy output", None).await;

    assert!(outcome.success);
    assert_eq!(outcome.steps, 4);
    assert_eq!(steps_of(&outcome), vec![1]);
}

#[tokio::test]
async fn repeated_decision_faults_abort() {
    let brain = ScriptedBrain::repeating(Decision::error("connection refused"));
    let mut agent = Agent::new(page(), brain, quiet_config(10)).unwrap();

    let outcome = agent.run("Talk to a dead endpoint", None).await;

    assert!(!outcome.success);
    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.steps, 2);
    assert!(outcome.message.contains("connection refused"));
    assert!(outcome.history.is_empty());
}

#[tokio::test]
async fn a_transient_decision_fault_heals() {
    let brain = ScriptedBrain::new(vec![
        Decision::error("timed out"),
        decision("extract", json!({"selector": "h1"})),
        Decision::error("timed out"),
        decision("done", json!({"result": "Example Domain"})),
    ]);
    let mut agent = Agent::new(page(), brain, quiet_config(10)).unwrap();

    let outcome = agent.run("Read the heading", None).await;

    assert!(outcome.success);
    assert_eq!(outcome.steps, 4);
    assert_eq!(steps_of(&outcome), vec![1, 2]);
}

#[tokio::test]
async fn extract_returns_what_the_page_holds() {
    let brain = ScriptedBrain::new(vec![
        decision("extract", json!({"selector": "h1"})),
        decision("extract", json!({"selector": "a.more", "attribute": "href"})),
        decision("extract", json!({"selector": "a.more", "attribute": "text"})),
        decision("done", json!({"result": "read"})),
    ]);
    let mut agent = Agent::new(page(), brain, quiet_config(10)).unwrap();

    let outcome = agent.run("Read the page", None).await;
    let values: Vec<_> = outcome
        .history
        .iter()
        .take(3)
        .map(|e| e.result.data.as_ref().unwrap()["value"].clone())
        .collect();

    assert_eq!(
        values,
        vec![
            json!("Example Domain"),
            json!("https://www.iana.org/domains/example"),
            json!("More information..."),
        ]
    );
}

#[tokio::test]
async fn initial_navigation_is_step_zero_and_feeds_the_first_prompt() {
    let browser = page();
    let brain = ScriptedBrain::new(vec![
        decision("click", json!({"selector": "a.more"})),
        decision("done", json!({"result": "done"})),
    ]);
    let requests = brain.requests.clone();
    let mut agent = Agent::new(browser, brain, quiet_config(5)).unwrap();

    let outcome = agent.run("Follow the link", Some("https://example.org/")).await;

    assert!(outcome.success);
    assert_eq!(outcome.steps, 2);
    assert_eq!(steps_of(&outcome), vec![0, 1, 2]);
    assert_eq!(
        outcome.history.entries()[0].action,
        Action::Navigate {
            url: "https://example.org/".into()
        }
    );

    let requests = requests.lock().unwrap();
    assert!(requests[0].prompt.contains("URL: https://example.org/"));
    assert!(requests[0].prompt.contains(r#""action_type":"navigate""#));
    assert!(requests[1].prompt.contains(r#""action_type":"click""#));
}

#[tokio::test]
async fn failed_initial_navigation_counts_towards_the_streak() {
    let mut browser = page();
    browser.unreachable_urls.push("https://down.test/".into());
    let brain = ScriptedBrain::repeating(decision("click", json!({"selector": "#gone"})));
    let mut agent = Agent::new(browser, brain, quiet_config(10)).unwrap();

    let outcome = agent.run("Use a broken site", Some("https://down.test/")).await;

    assert!(!outcome.success);
    assert_eq!(outcome.steps, 1);
    assert_eq!(steps_of(&outcome), vec![0, 1]);
}

#[tokio::test]
async fn page_html_is_truncated_with_a_marker() {
    let mut browser = page();
    browser.html = "<p>".repeat(100);
    let brain = ScriptedBrain::new(vec![decision("done", json!({"result": "ok"}))]);
    let requests = brain.requests.clone();
    let config = AgentConfig {
        html_max_chars: 30,
        ..quiet_config(3)
    };
    let mut agent = Agent::new(browser, brain, config).unwrap();

    agent.run("Look at the page", None).await;

    let requests = requests.lock().unwrap();
    let html = requests[0].html.as_deref().unwrap();
    assert!(html.starts_with(&"<p>".repeat(10)));
    assert!(html.ends_with("[truncated, 300 total chars]"));
}

#[tokio::test]
async fn perception_failures_do_not_stop_the_run() {
    let mut browser = page();
    browser.perceive_fails = true;
    let brain = ScriptedBrain::new(vec![decision("done", json!({"result": "blind but done"}))]);
    let requests = brain.requests.clone();
    let mut agent = Agent::new(browser, brain, quiet_config(3)).unwrap();

    let outcome = agent.run("Work blind", None).await;

    assert!(outcome.success);
    assert_eq!(outcome.history.entries()[0].snapshot.url, "unknown");
    assert!(requests.lock().unwrap()[0].prompt.contains("URL: unknown"));
}

#[tokio::test]
async fn screenshots_are_written_to_the_configured_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut browser = page();
    browser.screenshot = Some(b"\x89PNG fake".to_vec());
    let brain = ScriptedBrain::new(vec![decision("done", json!({"result": "ok"}))]);
    let requests = brain.requests.clone();
    let config = AgentConfig {
        screenshot_dir: Some(dir.path().to_path_buf()),
        ..quiet_config(3)
    };
    let mut agent = Agent::new(browser, brain, config).unwrap();

    agent.run("Take pictures", None).await;

    let files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert!(!files.is_empty());
    assert!(files.iter().all(|f| f.starts_with("screenshot_") && f.ends_with(".png")));
    assert!(requests.lock().unwrap()[0].screenshot.is_some());
}

#[tokio::test]
async fn the_browser_is_released_when_the_agent_goes_away() {
    let browser = page();
    let released = browser.released.clone();
    let brain = ScriptedBrain::repeating(decision("click", json!({"selector": "#gone"})));
    let mut agent = Agent::new(browser, brain, quiet_config(10)).unwrap();

    let outcome = agent.run("Fail fast", None).await;
    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(!released.load(Ordering::SeqCst));

    agent.close();
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn each_run_starts_with_a_fresh_history() {
    let brain = ScriptedBrain::new(vec![
        decision("done", json!({"result": "first"})),
        decision("done", json!({"result": "second"})),
    ]);
    let mut agent = Agent::new(page(), brain, quiet_config(3)).unwrap();

    let first = agent.run("one", None).await;
    let second = agent.run("two", None).await;

    assert_eq!(first.message, "first");
    assert_eq!(second.message, "second");
    assert_eq!(steps_of(&second), vec![1]);
}

#[test]
fn zero_step_budget_is_rejected_at_construction() {
    let brain = ScriptedBrain::new(vec![]);
    assert!(Agent::new(page(), brain, quiet_config(0)).is_err());
}

#[test]
fn outcome_serializes_for_auditing() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let brain = ScriptedBrain::new(vec![decision("done", json!({"result": "ok"}))]);
    let mut agent = Agent::new(page(), brain, quiet_config(3)).unwrap();

    let outcome = runtime.block_on(agent.run("Audit me", None));
    let value = serde_json::to_value(&outcome).unwrap();

    assert_eq!(value["success"], json!(true));
    assert_eq!(value["status"], json!("Succeeded"));
    assert_eq!(value["history"][0]["step"], json!(1));
    assert_eq!(
        value["history"][0]["action"],
        json!({"action_type": "done", "parameters": {"result": "ok"}})
    );
}
