//! End-to-end scenarios against real Touch-v2 files, driven through the
//! command dispatcher at fixed timestamps.

use std::path::Path;

use rrdb::command::{run_at, Request, Verb};
use rrdb::series::WallTime;

// 2021-03-01T12:30:00Z
const T0: i64 = 1614601800;

fn at(secs: i64) -> WallTime {
    WallTime { secs, micros: 0 }
}

fn touch(path: &Path, secs: i64, touch_path: &str, periods: &str) {
    let request = Request {
        verb: Verb::Touch,
        path: path.to_path_buf(),
        set_count: 50,
        sample_count: 100,
        xform: touch_path.into(),
        period: periods.into(),
        ..Request::default()
    };
    let mut out = Vec::new();
    run_at(&request, at(secs), &mut out).unwrap();
    assert!(out.is_empty());
}

fn fetch(path: &Path, secs: i64, touch_path: &str, period: &str) -> String {
    let request = Request {
        verb: Verb::Fetch,
        path: path.to_path_buf(),
        xform: touch_path.into(),
        period: period.into(),
        ..Request::default()
    };
    let mut out = Vec::new();
    run_at(&request, at(secs), &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

fn info(path: &Path) -> String {
    let request =
        Request { verb: Verb::Info, path: path.to_path_buf(), ..Request::default() };
    let mut out = Vec::new();
    run_at(&request, at(T0), &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn each_path_component_counts_separately() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.rrdb");

    touch(&path, T0, "a/b", "ONEHOUR");
    touch(&path, T0 + 2, "a/b", "ONEHOUR");

    assert_eq!(info(&path), "2:2:100\na:3600\nb:3600\n");
    let bucket = T0 - T0 % 3600;
    assert_eq!(fetch(&path, T0 + 2, "a", "ONEHOUR"), format!("{bucket}:2\n"));
    assert_eq!(fetch(&path, T0 + 2, "b", "ONEHOUR"), format!("{bucket}:2\n"));
}

#[test]
fn idle_sets_are_evicted_on_the_next_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.rrdb");

    touch(&path, T0, "a", "ONEHOUR");
    // one second past the span the ring covers
    let later = T0 + 100 * 3600 + 1;
    touch(&path, later, "b", "ONEHOUR");

    assert_eq!(info(&path), "2:1:100\nb:3600\n");
}

#[test]
fn periods_fan_out_per_component() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.rrdb");

    touch(&path, T0, "tech/support", "ONEHOUR,ONEDAY");
    assert_eq!(
        info(&path),
        "2:4:100\ntech:3600\ntech:86400\nsupport:3600\nsupport:86400\n"
    );
}

#[test]
fn fetch_skips_empty_buckets() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.rrdb");

    touch(&path, T0, "a", "ONEHOUR");
    touch(&path, T0 + 3600, "a", "ONEHOUR");

    let newest = (T0 + 3600) - (T0 + 3600) % 3600;
    let oldest = T0 - T0 % 3600;
    assert_eq!(
        fetch(&path, T0 + 3600, "a", "ONEHOUR"),
        format!("{newest}:1\n{oldest}:1\n")
    );
}

#[test]
fn fetch_for_an_unknown_path_prints_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.rrdb");
    touch(&path, T0, "a", "ONEHOUR");
    assert_eq!(fetch(&path, T0, "zz", "ONEHOUR"), "");
    assert_eq!(fetch(&path, T0, "a", "ONEDAY"), "");
}
