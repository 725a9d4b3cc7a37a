use super::*;
use chrono::{TimeZone, Utc};

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 14).unwrap()
}

fn msg(id: i64, channel: &ChannelIdentity) -> CollectedMessage {
    CollectedMessage::new(
        id,
        channel,
        Utc.with_ymd_and_hms(2025, 1, 14, 6, 0, 0).unwrap(),
        Some(format!("post {id}")),
        10,
        0,
    )
}

#[test]
fn snapshot_path_is_date_then_channel() {
    let path = snapshot_path(
        Path::new("/lake/telegram_messages"),
        date(),
        &ChannelIdentity::new("CheMed123"),
    );
    assert_eq!(
        path,
        PathBuf::from("/lake/telegram_messages/2025-01-14/CheMed123.json")
    );
}

#[test]
fn media_path_is_keyed_by_message_id() {
    let path = media_path(Path::new("/lake/images"), &ChannelIdentity::new("EAHPA"), 77);
    assert_eq!(path, PathBuf::from("/lake/images/EAHPA/77.jpg"));
}

#[test]
fn parse_snapshot_path_round_trips_partition_key() {
    let file = parse_snapshot_path(Path::new("/lake/2025-01-14/yetenaweg.json")).unwrap();
    assert_eq!(file.capture_date, date());
    assert_eq!(file.channel.as_str(), "yetenaweg");
}

#[test]
fn parse_snapshot_path_rejects_partial_and_undated_files() {
    assert!(parse_snapshot_path(Path::new("/lake/2025-01-14/x.json.partial")).is_err());
    assert!(parse_snapshot_path(Path::new("/lake/latest/x.json")).is_err());
}

#[tokio::test]
async fn write_snapshot_produces_json_array_with_wire_field_names() {
    let dir = tempfile::tempdir().unwrap();
    let channel = ChannelIdentity::new("tikvahpharma");
    let snapshot = write_snapshot(dir.path(), date(), &channel, vec![msg(2, &channel), msg(1, &channel)])
        .await
        .unwrap();

    let entries = read_snapshot_entries(&snapshot.path).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["message_id"], 2);
    assert_eq!(entries[0]["message_text"], "post 2");
    assert!(entries[0].get("message_date").is_some());
    assert_eq!(entries[0]["views"], 10);
    assert_eq!(entries[0]["image_path"], serde_json::Value::Null);

    let mut partial = snapshot.path.as_os_str().to_owned();
    partial.push(".partial");
    assert!(!PathBuf::from(partial).exists());
}

#[tokio::test]
async fn rerun_on_same_day_supersedes_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let channel = ChannelIdentity::new("EAHPA");
    write_snapshot(dir.path(), date(), &channel, vec![msg(1, &channel), msg(2, &channel)])
        .await
        .unwrap();
    let second = write_snapshot(dir.path(), date(), &channel, vec![msg(3, &channel)])
        .await
        .unwrap();

    let entries = read_snapshot_entries(&second.path).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["message_id"], 3);
}

#[tokio::test]
async fn read_rejects_non_array_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, br#"{"message_id": 1}"#).unwrap();
    let err = read_snapshot_entries(&path).await.unwrap_err();
    assert!(matches!(err, LakeError::Parse { .. }));
}

#[tokio::test]
async fn discover_lists_snapshots_sorted_and_skips_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    let a = ChannelIdentity::new("lobelia4cosmetics");
    let b = ChannelIdentity::new("CheMed123");
    let other_day = NaiveDate::from_ymd_opt(2025, 1, 13).unwrap();

    write_snapshot(dir.path(), date(), &a, vec![]).await.unwrap();
    write_snapshot(dir.path(), date(), &b, vec![]).await.unwrap();
    write_snapshot(dir.path(), other_day, &a, vec![]).await.unwrap();
    std::fs::write(dir.path().join("2025-01-14/half.json.partial"), b"[").unwrap();
    std::fs::write(dir.path().join("README"), b"not a partition").unwrap();

    let all = discover_snapshots(dir.path(), None).await.unwrap();
    let keys: Vec<(String, &str)> = all
        .iter()
        .map(|f| (f.capture_date.to_string(), f.channel.as_str()))
        .collect();
    assert_eq!(
        keys,
        vec![
            ("2025-01-13".to_string(), "lobelia4cosmetics"),
            ("2025-01-14".to_string(), "CheMed123"),
            ("2025-01-14".to_string(), "lobelia4cosmetics"),
        ]
    );

    let one_day = discover_snapshots(dir.path(), Some(other_day))
        .await
        .unwrap();
    assert_eq!(one_day.len(), 1);
}

#[tokio::test]
async fn discover_on_missing_root_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    assert!(discover_snapshots(&missing, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn write_media_creates_channel_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_media(dir.path(), &ChannelIdentity::new("EAHPA"), 9, b"\xff\xd8")
        .await
        .unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"\xff\xd8");
    assert!(path.ends_with("EAHPA/9.jpg"));
}
