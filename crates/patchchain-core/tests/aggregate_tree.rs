use patchchain_core::stats::{classify, merge, scan_solver_logs, scan_summary_log, NodeId};
use std::fs;
use std::path::Path;

fn attempt_log(conflicts: i64, time: f64) -> String {
    format!(
        "starts        :            1\n\
         conflicts     :  {conflicts:>11}\n\
         decisions     :          700\n\
         propagations  :        91000\n\
         Final SAT = 0, UNSAT = 1, {time:.2} sec\n"
    )
}

fn write(path: &Path, text: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

#[test]
fn tree_scan_merges_attempt_logs_with_summary() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(&root.join("1/replace_7_cec.log"), &attempt_log(120, 410.0));
    write(&root.join("1/nested/replace_9_cec.log"), &attempt_log(40, 300.0));
    write(&root.join("2/replace_11_cec.log"), &attempt_log(9000, 500.0));
    write(&root.join("2/replace_11.log"), &attempt_log(1, 1.0));
    write(&root.join("2/notes.txt"), "conflicts     : 5\n");
    write(
        &root.join("_info.log"),
        "header noise\n\
         UNSAT (rewritable): \n\
         7 (31): color = 1, level = 3, conflict = 88, cost = 1.5, costThreshold = 2.0\n\
         absSize = 30, absHeight = 5, #Ci = 4, #absXor = 0, #absMux = 1\n\
         patchSize = 12, patchHeight = 4, #Ci = 3, #patchXor = 1, #patchMux = 0\n\
         21 (50): color = 2, level = 1, conflict = 2, cost = 0.1, costThreshold = 0.2\n",
    );

    let solver = scan_solver_logs(root);
    assert_eq!(solver.len(), 3);
    let summary = scan_summary_log(&root.join("_info.log"));
    assert_eq!(summary.len(), 2);

    let merged = merge(solver, summary);
    let seven = &merged[&NodeId::from("7")];
    assert_eq!(seven.conflict, Some(120));
    assert_eq!(seven.time, Some(410.0));
    assert_eq!(seven.abs_size, Some(30));
    assert_eq!(seven.patch_size, Some(12));
    assert_eq!(seven.decision, Some(700));
    assert_eq!(seven.propagation, Some(91000));

    let twenty_one = &merged[&NodeId::from("21")];
    assert_eq!(twenty_one.time, None);
    assert_eq!(twenty_one.abs_id, Some(50));

    let buckets = classify(&merged, 431.86);
    assert_eq!(buckets.render(), "7,9,\n7,11,\n");
}

#[test]
fn missing_sources_yield_empty_stats() {
    let tmp = tempfile::tempdir().unwrap();
    assert!(scan_solver_logs(&tmp.path().join("absent")).is_empty());
    assert!(scan_summary_log(&tmp.path().join("absent.log")).is_empty());
}
