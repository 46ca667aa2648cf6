//! Remote workers reaching the pool through the gateway's `/ws` bridge

use std::time::Duration;

use poolwarden::config::AppConfig;
use poolwarden::error::PoolError;
use poolwarden::gateway;
use poolwarden::transport::{ws, Endpoint, CLIENT_ADDRESS_PREFIX};
use poolwarden::workers::{Connector, WsConnector};
use poolwarden::PoolService;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

async fn start_gateway(pool: &PoolService) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = pool.gateway_state();
    let shutdown_rx = pool.subscribe_shutdown();
    let handle = tokio::spawn(async move {
        gateway::serve(listener, state, shutdown_rx).await.unwrap();
    });
    (format!("ws://{addr}/ws"), handle)
}

#[tokio::test]
async fn catalog_round_trips_over_websocket() {
    let config = AppConfig::default();
    let pool = PoolService::start(&config);
    let (url, gateway) = start_gateway(&pool).await;

    let connector = WsConnector::new(url, 64, Some(Duration::from_secs(5)));
    let storage = connector.connect().await.unwrap();

    assert!(storage.register_cleaner("remote-1").await.unwrap());
    assert!(storage.get_cleaner_idle("remote-1").await.unwrap());
    storage.set_cleaner_idle("remote-1", false).await.unwrap();
    assert!(!storage.get_cleaner_idle("remote-1").await.unwrap());

    assert!(storage.try_send_file("a.log", 10).await.unwrap());
    assert!(storage.try_send_file("b.log", 20).await.unwrap());
    assert_eq!(storage.get_file_count().await.unwrap(), 2);

    let taken = storage.try_get_file(1).await.unwrap().unwrap();
    assert_eq!(taken.name, "b.log");
    assert!(storage.try_get_file(5).await.unwrap().is_none());

    assert!(!storage.is_cleaning_mode().await.unwrap());
    assert_eq!(pool.coordinator.snapshot().await.occupied, 10);
    assert!(pool.metrics.snapshot().ws_connections >= 1);

    drop(storage);
    pool.shutdown().await;
    let _ = tokio::time::timeout(Duration::from_secs(5), gateway).await;
}

#[tokio::test]
async fn socket_adopts_the_address_the_gateway_assigned() {
    let config = AppConfig::default();
    let pool = PoolService::start(&config);
    let (url, gateway) = start_gateway(&pool).await;

    let connection = ws::connect(&url, 8).await.unwrap();
    let address = connection.endpoint.reply_to().to_string();
    assert!(address.starts_with(CLIENT_ADDRESS_PREFIX));
    assert!(pool.bus.is_declared(&address));

    drop(connection);
    pool.shutdown().await;
    let _ = tokio::time::timeout(Duration::from_secs(5), gateway).await;
}

#[tokio::test]
async fn remote_errors_keep_their_kind() {
    let config = AppConfig::default();
    let pool = PoolService::start(&config);
    let (url, gateway) = start_gateway(&pool).await;

    let storage = WsConnector::new(url, 64, Some(Duration::from_secs(5)))
        .connect()
        .await
        .unwrap();

    let err = storage.get_cleaner_idle("ghost").await.unwrap_err();
    assert!(matches!(err, PoolError::UnknownCleaner(ref id) if id == "ghost"));

    drop(storage);
    pool.shutdown().await;
    let _ = tokio::time::timeout(Duration::from_secs(5), gateway).await;
}

#[tokio::test]
async fn two_sockets_do_not_see_each_others_replies() {
    let config = AppConfig::default();
    let pool = PoolService::start(&config);
    let (url, gateway) = start_gateway(&pool).await;

    let connector = WsConnector::new(url, 64, Some(Duration::from_secs(5)));
    let first = connector.connect().await.unwrap();
    let second = connector.connect().await.unwrap();

    first.register_cleaner("left").await.unwrap();
    second.register_cleaner("right").await.unwrap();
    second.set_cleaner_idle("right", false).await.unwrap();

    let (left, right) = tokio::join!(
        first.get_cleaner_idle("left"),
        second.get_cleaner_idle("right")
    );
    assert!(left.unwrap());
    assert!(!right.unwrap());

    drop(first);
    drop(second);
    pool.shutdown().await;
    let _ = tokio::time::timeout(Duration::from_secs(5), gateway).await;
}

#[tokio::test]
async fn connecting_to_a_dead_gateway_is_a_transport_failure() {
    // bind and immediately release a port so nothing is listening there
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = WsConnector::new(format!("ws://{addr}/ws"), 8, None)
        .connect()
        .await;
    match result {
        Ok(_) => panic!("connected to a closed port"),
        Err(err) => assert!(err.is_transport(), "unexpected error {err:?}"),
    }
}
