mod common;

use common::{Fault, FaultyStore, read_all, task};
use file_hub::{
    errors::FileHubError,
    services::{FileHub, HubSettings, keys},
};
use std::{
    io::Cursor,
    sync::Arc,
    time::{Duration, Instant},
};
use uuid::Uuid;

fn hub() -> (FileHub, FaultyStore) {
    let store = FaultyStore::new();
    (
        FileHub::new(Arc::new(store.clone()), HubSettings::default()),
        store,
    )
}

#[tokio::test]
async fn uploaded_group_is_reported_and_no_longer_tracked() {
    let (hub, _) = hub();
    let (owner, group) = (Uuid::new_v4(), Uuid::new_v4());
    let tasks = vec![
        task(owner, group, "a.txt", b"alpha"),
        task(owner, group, "b.txt", b"bravo"),
    ];
    let (f1, f2) = (tasks[0].file_id, tasks[1].file_id);

    let uploaded = hub.upload_group(owner, group, tasks).await.unwrap();

    assert_eq!(uploaded.group_id, group);
    assert_eq!(uploaded.file_ids.len(), 2);
    assert!(uploaded.file_ids.contains(&f1));
    assert!(uploaded.file_ids.contains(&f2));
    assert!(matches!(
        hub.group_progress(owner, group).await,
        Err(FileHubError::GroupAlreadyTransferred)
    ));
    assert!(matches!(
        hub.file_progress(owner, group, f1).await,
        Err(FileHubError::GroupAlreadyTransferred)
    ));

    let details = hub.file_details(owner, group, f1).await.unwrap();
    assert_eq!(details.file_name, "a.txt");
    assert_eq!(details.content_length, 5);
    assert_eq!(details.owner_id, owner);
}

#[tokio::test]
async fn file_ids_follow_completion_order() {
    let (hub, store) = hub();
    let (owner, group) = (Uuid::new_v4(), Uuid::new_v4());
    let slow = task(owner, group, "slow.bin", b"slow");
    let fast = task(owner, group, "fast.bin", b"fast");
    let (slow_id, fast_id) = (slow.file_id, fast.file_id);
    store.inject(slow_id, Fault::DelayPut(Duration::from_millis(300)));

    let uploaded = hub
        .upload_group(owner, group, vec![slow, fast])
        .await
        .unwrap();
    assert_eq!(uploaded.file_ids, vec![fast_id, slow_id]);
}

#[tokio::test]
async fn first_failure_wins_and_siblings_are_aborted() {
    let (hub, store) = hub();
    let (owner, group) = (Uuid::new_v4(), Uuid::new_v4());
    let tasks = vec![
        task(owner, group, "a.txt", b"a"),
        task(owner, group, "b.txt", b"b"),
        task(owner, group, "c.txt", b"c"),
    ];
    store.inject(tasks[0].file_id, Fault::DelayPut(Duration::from_secs(2)));
    store.inject(tasks[1].file_id, Fault::FailPut);
    store.inject(tasks[2].file_id, Fault::DelayPut(Duration::from_secs(2)));

    let started = Instant::now();
    let err = hub.upload_group(owner, group, tasks).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(1));
    match err {
        FileHubError::FailedToUpload { file_name, .. } => assert_eq!(file_name, "b.txt"),
        other => panic!("unexpected error: {other:?}"),
    }

    // Aborted siblings never reach the store and the group is free again.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(matches!(
        hub.get_group(owner, group).await,
        Err(FileHubError::GroupNotFound { .. })
    ));
    assert!(matches!(
        hub.group_progress(owner, group).await,
        Err(FileHubError::GroupAlreadyTransferred)
    ));
    let retried = hub
        .upload_group(owner, group, vec![task(owner, group, "a.txt", b"a")])
        .await
        .unwrap();
    assert_eq!(retried.file_ids.len(), 1);
}

#[tokio::test]
async fn progress_is_visible_while_a_group_is_in_flight() {
    let (hub, store) = hub();
    let (owner, group) = (Uuid::new_v4(), Uuid::new_v4());
    let slow = task(owner, group, "slow.bin", b"slow");
    let fast = task(owner, group, "fast.bin", b"fast");
    let (slow_id, fast_id) = (slow.file_id, fast.file_id);
    store.inject(slow_id, Fault::DelayPut(Duration::from_millis(500)));

    let uploading = {
        let hub = hub.clone();
        tokio::spawn(async move { hub.upload_group(owner, group, vec![slow, fast]).await })
    };

    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if let Ok(50) = hub.group_progress(owner, group).await {
            break;
        }
        assert!(Instant::now() < deadline, "group never reached 50%");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(matches!(
        hub.file_progress(owner, group, fast_id).await,
        Err(FileHubError::FileAlreadyTransferred)
    ));
    assert_eq!(hub.file_progress(owner, group, slow_id).await.unwrap(), 0);
    assert!(matches!(
        hub.upload_group(owner, group, vec![task(owner, group, "x", b"x")])
            .await,
        Err(FileHubError::GroupUploadInProgress(_))
    ));

    uploading.await.unwrap().unwrap();
    assert!(matches!(
        hub.group_progress(owner, group).await,
        Err(FileHubError::GroupAlreadyTransferred)
    ));
}

#[tokio::test]
async fn unknown_group_is_not_found() {
    let (hub, _) = hub();
    let (owner, group) = (Uuid::new_v4(), Uuid::new_v4());
    assert!(matches!(
        hub.get_group(owner, group).await,
        Err(FileHubError::GroupNotFound { .. })
    ));
    assert!(matches!(
        hub.share_group(owner, group).await,
        Err(FileHubError::GroupNotFound { .. })
    ));
    assert!(hub.list_owner_files(owner).await.unwrap().is_empty());
}

#[tokio::test]
async fn a_failing_fetch_fails_the_whole_group() {
    let (hub, store) = hub();
    let (owner, group) = (Uuid::new_v4(), Uuid::new_v4());
    let tasks = vec![
        task(owner, group, "a.txt", b"a"),
        task(owner, group, "b.txt", b"b"),
    ];
    let broken = tasks[1].file_id;
    store.inject(tasks[0].file_id, Fault::DelayGet(Duration::from_secs(2)));
    hub.upload_group(owner, group, tasks).await.unwrap();
    store.inject(broken, Fault::FailGet);

    let started = Instant::now();
    let err = hub.get_group(owner, group).await.unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(matches!(err, FileHubError::Store(_)));
}

#[tokio::test]
async fn shared_file_link_points_at_the_object_for_a_minute() {
    let (hub, _) = hub();
    let (owner, group) = (Uuid::new_v4(), Uuid::new_v4());
    let upload = task(owner, group, "a.txt", b"alpha");
    let file_id = upload.file_id;
    hub.upload_group(owner, group, vec![upload]).await.unwrap();

    let issued = chrono::Utc::now();
    let link = hub.share_file(owner, group, file_id).await.unwrap();

    assert_eq!(link.key, keys::object_key(owner, group, file_id));
    assert!(link.url.starts_with("http://"));
    assert!(link.url.contains(&link.key));
    let ttl = (link.expires_at - issued).num_seconds();
    assert!((58..=61).contains(&ttl), "ttl was {ttl}");

    assert!(matches!(
        hub.share_file(owner, group, Uuid::new_v4()).await,
        Err(FileHubError::FileNotFound { .. })
    ));
}

#[tokio::test]
async fn shared_group_is_archived_as_a_new_object() {
    let (hub, _) = hub();
    let (owner, group) = (Uuid::new_v4(), Uuid::new_v4());
    let tasks = vec![
        task(owner, group, "notes.txt", b"first"),
        task(owner, group, "notes.txt", b"second!"),
        task(owner, group, "photo.jpg", b"\xff\xd8"),
    ];
    hub.upload_group(owner, group, tasks).await.unwrap();

    let link = hub.share_group(owner, group).await.unwrap();
    assert!(link.key.starts_with(&format!("{owner}/")));
    assert!(!link.key.starts_with(&keys::group_prefix(owner, group)));

    let archive = hub.access().get(&link.key).await.unwrap();
    assert_eq!(archive.content_type, "application/zip");
    let bytes = read_all(archive.body).await;
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(names, vec!["notes (1).txt", "notes.txt", "photo.jpg"]);

    let mut sizes: Vec<u64> = (0..zip.len())
        .map(|i| zip.by_index(i).unwrap().size())
        .collect();
    sizes.sort();
    assert_eq!(sizes, vec![2, 5, 7]);

    let archived = hub.list_owner_files(owner).await.unwrap();
    assert_eq!(archived.len(), 4);
    assert!(
        archived
            .iter()
            .any(|f| f.file_name.starts_with("files") && f.file_name.ends_with(".zip"))
    );
}

#[tokio::test]
async fn deleted_file_is_gone_and_cannot_be_deleted_twice() {
    let (hub, _) = hub();
    let (owner, group) = (Uuid::new_v4(), Uuid::new_v4());
    let upload = task(owner, group, "a.txt", b"alpha");
    let file_id = upload.file_id;
    hub.upload_group(owner, group, vec![upload]).await.unwrap();

    hub.delete_file(owner, group, file_id).await.unwrap();
    assert!(matches!(
        hub.get_file(owner, group, file_id).await,
        Err(FileHubError::FileNotFound { .. })
    ));
    assert!(matches!(
        hub.delete_file(owner, group, file_id).await,
        Err(FileHubError::FailedToDelete { .. })
    ));
}

#[tokio::test]
async fn unreachable_bucket_fails_the_upload_with_the_file_name() {
    let (hub, store) = hub();
    let (owner, group) = (Uuid::new_v4(), Uuid::new_v4());
    store.break_buckets();

    let err = hub
        .upload_group(owner, group, vec![task(owner, group, "a.txt", b"alpha")])
        .await
        .unwrap_err();
    match err {
        FileHubError::FailedToUpload { file_name, .. } => assert_eq!(file_name, "a.txt"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(matches!(
        hub.group_progress(owner, group).await,
        Err(FileHubError::GroupAlreadyTransferred)
    ));
}

#[tokio::test]
async fn file_details_are_read_without_downloading_bodies() {
    let (hub, store) = hub();
    let (owner, group) = (Uuid::new_v4(), Uuid::new_v4());
    let tasks = vec![
        task(owner, group, "a.txt", b"alpha"),
        task(owner, group, "b.txt", b"bravo!"),
    ];
    let first = tasks[0].file_id;
    hub.upload_group(owner, group, tasks).await.unwrap();

    assert_eq!(hub.list_owner_files(owner).await.unwrap().len(), 2);
    assert_eq!(hub.group_details(owner, group).await.unwrap().len(), 2);
    let details = hub.file_details(owner, group, first).await.unwrap();
    assert_eq!(details.content_length, 5);
    assert!(matches!(
        hub.file_details(owner, group, Uuid::new_v4()).await,
        Err(FileHubError::FileNotFound { .. })
    ));
    assert_eq!(store.gets(), 0);
}
