use std::io::Write as _;

use super::*;

const TPS: i64 = 300;

fn filled(sps: u32, v: u32) -> Vec<u8> {
    let mut buf = vec![0u8; 4 * sps as usize];
    for i in 0..sps as usize {
        put_u32_at(&mut buf, 4 * i, v);
    }
    buf
}

fn count(buf: &[u8], i: usize) -> u32 {
    u32_at(buf, 4 * i)
}

#[test]
fn same_bucket_accumulates() {
    let mut buf = filled(10, 0);
    update_buckets(&mut buf, 10, 450, 455, TPS);
    update_buckets(&mut buf, 10, 455, 458, TPS);
    assert_eq!(count(&buf, 1), 2);
    assert_eq!(buf.iter().filter(|b| **b != 0).count(), 1);
}

#[test]
fn adjacent_bucket_clears_nothing() {
    let mut buf = filled(10, 9);
    update_buckets(&mut buf, 10, 5 * TPS, 6 * TPS, TPS);
    assert_eq!(count(&buf, 6), 10);
    assert_eq!(count(&buf, 5), 9);
    assert_eq!(count(&buf, 0), 9);
}

#[test]
fn gap_without_wrap_resets_ring() {
    let mut buf = filled(10, 9);
    update_buckets(&mut buf, 10, 2 * TPS, 6 * TPS, TPS);
    for i in 0..10 {
        assert_eq!(count(&buf, i), if i == 6 { 1 } else { 0 });
    }
}

#[test]
fn gap_with_wrap_preserves_live_span() {
    let mut buf = filled(10, 9);
    update_buckets(&mut buf, 10, 8 * TPS, 11 * TPS, TPS);
    assert_eq!(count(&buf, 9), 0);
    assert_eq!(count(&buf, 0), 0);
    assert_eq!(count(&buf, 1), 10);
    for i in 2..=8 {
        assert_eq!(count(&buf, i), 9);
    }
}

#[test]
fn whole_ring_gap_clears_everything() {
    let mut buf = filled(10, 9);
    update_buckets(&mut buf, 10, 0, 10 * TPS, TPS);
    for i in 0..10 {
        assert_eq!(count(&buf, i), if i == 0 { 1 } else { 0 });
    }
}

#[test]
fn bucket_index_handles_pre_epoch_times() {
    assert_eq!(bucket_index(-1, TPS, 10), 9);
    assert_eq!(bucket_index(0, TPS, 10), 0);
    assert_eq!(bucket_index(TPS * 13, TPS, 10), 3);
}

// 2021-03-01T12:30:00Z
const NOW: i64 = 1614601800;

fn info_of(file: &std::fs::File) -> String {
    let mut out = Vec::new();
    write_info(file, &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn touch_creates_one_set_per_component() {
    let file = tempfile::tempfile().unwrap();
    touch(&file, NOW, "a/b", "ONEHOUR", 0, 100).unwrap();
    assert_eq!(info_of(&file), "2:2:100\na:3600\nb:3600\n");
    assert_eq!(file.metadata().unwrap().len(), 12 + 2 * (112 + 400));
}

#[test]
fn touch_twice_counts_two() {
    let file = tempfile::tempfile().unwrap();
    touch(&file, NOW, "a/b", "ONEHOUR", 0, 100).unwrap();
    touch(&file, NOW + 2, "a/b", "ONEHOUR", 0, 100).unwrap();

    let bucket = Period::OneHour.window_start(NOW);
    for path in ["a", "b"] {
        let mut out = Vec::new();
        write_samples(&file, NOW + 2, path, "ONEHOUR", &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), format!("{bucket}:2\n"));
    }
}

#[test]
fn empty_fetch_path_matches_first_set_of_period() {
    let file = tempfile::tempfile().unwrap();
    touch(&file, NOW, "a", "ONEHOUR", 0, 50).unwrap();
    let mut out = Vec::new();
    write_samples(&file, NOW, "", "ONEHOUR", &mut out).unwrap();
    assert!(!out.is_empty());
}

#[test]
fn period_list_is_a_cartesian_product() {
    let file = tempfile::tempfile().unwrap();
    touch(&file, NOW, "x", "ONEHOUR,ONEDAY", 0, 50).unwrap();
    assert_eq!(info_of(&file), "2:2:50\nx:3600\nx:86400\n");
}

#[test]
fn unknown_period_counts_as_one_hour() {
    let file = tempfile::tempfile().unwrap();
    touch(&file, NOW, "x", "NONSENSE", 0, 50).unwrap();
    assert_eq!(info_of(&file), "2:1:50\nx:3600\n");
}

#[test]
fn idle_sets_are_evicted_and_the_file_shrinks() {
    let file = tempfile::tempfile().unwrap();
    touch(&file, NOW, "a", "ONEHOUR", 0, 100).unwrap();

    let later = NOW + 100 * 3600 + 1;
    touch(&file, later, "b", "ONEHOUR", 0, 100).unwrap();

    assert_eq!(info_of(&file), "2:1:100\nb:3600\n");
    assert_eq!(file.metadata().unwrap().len(), 12 + (112 + 400));
}

#[test]
fn capacity_reuses_the_oldest_set() {
    let file = tempfile::tempfile().unwrap();
    touch(&file, NOW, "a", "ONEHOUR", 1, 100).unwrap();
    touch(&file, NOW + 10, "b", "ONEHOUR", 1, 100).unwrap();

    assert_eq!(info_of(&file), "2:1:100\nb:3600\n");
    let mut out = Vec::new();
    write_samples(&file, NOW + 10, "b", "ONEHOUR", &mut out).unwrap();
    let bucket = Period::OneHour.window_start(NOW + 10);
    assert_eq!(String::from_utf8(out).unwrap(), format!("{bucket}:1\n"));
}

#[test]
fn non_touch_files_are_rejected() {
    let file = tempfile::tempfile().unwrap();
    (&file).write_all(&1u32.to_le_bytes()).unwrap();
    (&file).write_all(&[0u8; 8]).unwrap();
    assert!(matches!(
        touch(&file, NOW, "a", "", 0, 0),
        Err(Error::UnknownVersion)
    ));
}

#[test]
fn oversize_path_component_is_rejected() {
    let file = tempfile::tempfile().unwrap();
    let long = "p".repeat(PATH_LEN);
    assert!(matches!(
        touch(&file, NOW, &long, "ONEHOUR", 0, 0),
        Err(Error::Input(_))
    ));
}
