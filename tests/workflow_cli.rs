mod support;

use support::{ids, TestDir};

#[test]
fn wait_blocks_then_resolution_unblocks() {
    let dir = TestDir::new();
    dir.project("ab");

    let task = dir.add(&["Ship the release"]);
    assert_eq!(task, "AB-01");

    let wait = dir.json(&["wait", "Review", "--question", "Approved?"]);
    assert_eq!(wait["data"]["id"], "AB-02W");
    assert_eq!(wait["data"]["criteria"]["type"], "manual");

    dir.tw().args(["block", "AB-01", "AB-02W"]).assert().success();

    let shown = dir.json(&["show", "AB-01"]);
    assert_eq!(shown["data"]["state"], "waiting");
    assert_eq!(ids(&shown["data"]["unresolved"]), vec!["AB-02W"]);

    let err = dir.json_err(&["done", "AB-01"], 3);
    assert_eq!(err["status"], "error");
    assert_eq!(err["command"], "done");
    assert_eq!(err["error"]["kind"], "dependency_blocked");
    assert_eq!(ids(&err["error"]["details"]["blockers"]), vec!["AB-02W"]);

    let resolved = dir.json(&["resolve", "AB-02W", "yes"]);
    assert_eq!(ids(&resolved["data"]["unblocked"]), vec!["AB-01"]);

    dir.json(&["done", "AB-01"]);
    let open = dir.json(&["list"]);
    assert_eq!(open["data"]["total"], 0);
    let everything = dir.json(&["list", "--all"]);
    assert_eq!(everything["data"]["total"], 2);
}

#[test]
fn auto_complete_chain_closes_on_resolution() {
    let dir = TestDir::new();
    dir.project("ab");

    let wait = dir.json(&["wait", "--question", "Payment received?"]);
    let wait = wait["data"]["id"].as_str().expect("wait id").to_string();
    let first = dir.add(&["Invoice", "--auto-complete", "--blocked-by", &wait]);
    let second = dir.add(&["Close books", "--auto-complete", "--blocked-by", &first]);

    let resolved = dir.json(&["resolve", &wait]);
    assert_eq!(ids(&resolved["data"]["auto_completed"]), vec![first, second]);
}

#[test]
fn forced_completion_strips_blockers() {
    let dir = TestDir::new();
    dir.project("ab");
    let blocker = dir.add(&["Blocker"]);
    let task = dir.add(&["Impatient", "--blocked-by", &blocker]);

    let done = dir.json(&["done", &task, "--force"]);
    assert_eq!(ids(&done["data"]["stripped"]), vec![blocker]);

    let shown = dir.json(&["show", &task]);
    assert_eq!(shown["data"]["state"], "done");
    assert!(ids(&shown["data"]["blocked_by"]).is_empty());
}

#[test]
fn cycles_are_rejected_with_path() {
    let dir = TestDir::new();
    dir.project("ab");
    let first = dir.add(&["First"]);
    let second = dir.add(&["Second", "--blocked-by", &first]);

    let err = dir.json_err(&["block", &first, &second], 3);
    assert_eq!(
        ids(&err["error"]["details"]["path"]),
        vec![first.clone(), second, first.clone()]
    );

    let err = dir.json_err(&["block", &first, &first], 3);
    assert_eq!(ids(&err["error"]["details"]["path"]), vec![first.clone(), first]);
}

#[test]
fn drop_modes() {
    let dir = TestDir::new();
    dir.project("ab");
    let base = dir.add(&["Base"]);
    let dependent = dir.add(&["Dependent", "--blocked-by", &base]);

    let err = dir.json_err(&["drop", &base], 3);
    assert_eq!(ids(&err["error"]["details"]["dependents"]), vec![dependent.clone()]);
    assert!(err["next_steps"]
        .as_array()
        .expect("next steps")
        .iter()
        .any(|step| step.as_str() == Some("tw drop AB-01 --remove-deps")));

    let dropped = dir.json(&["drop", &base, "--remove-deps", "--reason", "obsolete"]);
    assert_eq!(ids(&dropped["data"]["dropped"]), vec![base]);
    assert_eq!(ids(&dropped["data"]["unreferenced"]), vec![dependent.clone()]);

    let shown = dir.json(&["show", &dependent]);
    assert_eq!(shown["data"]["state"], "ready");
}

#[test]
fn drop_cascades_to_dependents() {
    let dir = TestDir::new();
    dir.project("ab");
    let base = dir.add(&["Base"]);
    let middle = dir.add(&["Middle", "--blocked-by", &base]);
    let leaf = dir.add(&["Leaf", "--blocked-by", &middle]);

    let dropped = dir.json(&["drop", &base, "--drop-deps"]);
    assert_eq!(ids(&dropped["data"]["dropped"]), vec![base, middle, leaf]);
}

#[test]
fn defer_and_periodic_check() {
    let dir = TestDir::new();
    dir.project("ab");
    let task = dir.add(&["Later"]);

    let deferred = dir.json(&["defer", &task, "3d"]);
    let wait = deferred["data"]["wait"].as_str().expect("wait id").to_string();
    assert_eq!(wait, "AB-02W");

    let shown = dir.json(&["show", &task]);
    assert_eq!(shown["data"]["state"], "waiting");

    let err = dir.json_err(&["defer", &task, "5d"], 2);
    assert_eq!(err["error"]["details"]["wait"], "AB-02W");

    let checked = dir.json(&["check", "--now", "2099-01-01"]);
    assert_eq!(ids(&checked["data"]["resolved"]), vec![wait.clone()]);

    let shown = dir.json(&["show", &task]);
    assert_eq!(shown["data"]["state"], "ready");
    let wait_view = dir.json(&["show", &wait]);
    assert_eq!(wait_view["data"]["resolution"], "time elapsed");
}

#[test]
fn dormant_wait_cannot_be_resolved() {
    let dir = TestDir::new();
    dir.project("ab");
    let task = dir.add(&["Prepare"]);
    let wait = dir.json(&["wait", "--question", "Accepted?", "--blocked-by", &task]);
    let wait = wait["data"]["id"].as_str().expect("wait id").to_string();

    let shown = dir.json(&["show", &wait]);
    assert_eq!(shown["data"]["state"], "dormant");
    dir.json_err(&["resolve", &wait], 2);

    let done = dir.json(&["done", &task]);
    assert_eq!(ids(&done["data"]["activated"]), vec![wait.clone()]);
    let shown = dir.json(&["show", &wait]);
    assert_eq!(shown["data"]["state"], "actionable");
}

#[test]
fn edit_reopen_and_state_filter() {
    let dir = TestDir::new();
    dir.project("ab");
    let task = dir.add(&["Draft"]);

    let edited = dir.json(&["edit", &task, "--title", "Final draft", "--priority", "1", "--tag", "docs"]);
    assert_eq!(edited["data"]["title"], "Final draft");
    assert_eq!(edited["data"]["priority"], 1);

    dir.json_err(&["edit", &task], 2);
    dir.json_err(&["edit", &task, "--priority", "9"], 2);

    dir.json(&["done", &task]);
    let done = dir.json(&["list", "--state", "done"]);
    assert_eq!(done["data"]["total"], 1);

    dir.json(&["reopen", &task]);
    let ready = dir.json(&["list", "--state", "ready"]);
    assert_eq!(ready["data"]["items"][0]["id"], task.as_str());

    dir.json_err(&["list", "--state", "sleeping"], 2);
}
