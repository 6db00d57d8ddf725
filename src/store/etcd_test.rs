use super::etcd::prefix_range_end;
use super::etcd::watch_create_request;
use super::*;
use crate::proto::watch_request::RequestUnion;
use crate::StoreConfig;
use crate::StoreError;

#[test]
fn range_end_increments_last_byte() {
    assert_eq!(prefix_range_end(b"/configs/curiosity/"), b"/configs/curiosity0".to_vec());
    assert_eq!(prefix_range_end(b"a"), b"b".to_vec());
}

#[test]
fn range_end_skips_trailing_max_bytes() {
    assert_eq!(prefix_range_end(&[b'a', 0xff, 0xff]), vec![b'b']);
    assert_eq!(prefix_range_end(&[0xff]), vec![0]);
    assert_eq!(prefix_range_end(b""), vec![0]);
}

#[test]
fn watch_resumes_after_range_revision() {
    let Some(RequestUnion::CreateRequest(create)) = watch_create_request("/configs/curiosity/", Some(41)).request_union
    else {
        panic!("expected a create request");
    };

    assert_eq!(create.key, b"/configs/curiosity/".to_vec());
    assert_eq!(create.range_end, b"/configs/curiosity0".to_vec());
    assert_eq!(create.start_revision, 42);
}

#[test]
fn watch_without_range_starts_at_current_revision() {
    let Some(RequestUnion::CreateRequest(create)) = watch_create_request("/configs/curiosity/", None).request_union
    else {
        panic!("expected a create request");
    };

    assert_eq!(create.start_revision, 0);
}

#[tokio::test]
async fn connect_is_lazy_and_accepts_bare_addresses() {
    let config = StoreConfig {
        endpoints: vec!["127.0.0.1:1".to_string(), "http://127.0.0.1:2".to_string()],
        ..Default::default()
    };

    let factory = EtcdStoreFactory::new(config);
    assert!(factory.connect().is_ok());
}

#[tokio::test]
async fn malformed_endpoint_is_rejected() {
    let config = StoreConfig {
        endpoints: vec!["http://bad host:2379".to_string()],
        ..Default::default()
    };

    assert!(matches!(
        EtcdStore::connect_lazy(&config),
        Err(StoreError::InvalidEndpoint(_))
    ));
}

#[tokio::test]
async fn closed_store_rejects_requests() {
    let store = EtcdStore::connect_lazy(&StoreConfig::default()).unwrap();

    store.close().await.unwrap();
    store.close().await.unwrap();

    assert!(matches!(
        store.fetch_prefix("/configs/").await,
        Err(StoreError::Closed)
    ));
    assert!(matches!(
        store.cancel_watch(1).await,
        Err(StoreError::WatchNotFound(1))
    ));
}
