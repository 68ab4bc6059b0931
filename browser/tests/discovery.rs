use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use tacops_browser::{
    protocol::{decode, server::ServerAddress, GameVariant, ServerRecord},
    Details, DiscoveryBuilder, Error, MasterEndpoint, ServerQuery, Summary, UdpQuery,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, UdpSocket},
};

struct Logger;
static LOGGER: Logger = Logger;

impl log::Log for Logger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        println!("{} - {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

fn init_logger() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Trace);
    }
}

/// Serves one handshake per connection with the given list.
async fn fake_master(list: &'static str) -> MasterEndpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let (mut sock, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                sock.write_all(b"\\basic\\\\secure\\TXKOAT").await.unwrap();
                let mut buf = Vec::new();
                let mut tmp = [0; 256];
                // validate and list requests both end with final
                while buf.windows(7).filter(|w| *w == b"\\final\\").count() < 2 {
                    let n = sock.read(&mut tmp).await.unwrap();
                    if n == 0 {
                        return;
                    }
                    buf.extend_from_slice(&tmp[..n]);
                }
                assert!(buf.starts_with(b"\\gamename\\ut\\location\\0\\validate\\wptAmKCn\\final\\"));
                sock.write_all(list.as_bytes()).await.unwrap();
            });
        }
    });
    MasterEndpoint::new("127.0.0.1", port)
}

async fn dead_master() -> MasterEndpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    MasterEndpoint::new("127.0.0.1", port)
}

/// Answers `info` only for one address.
#[derive(Clone, Default)]
struct OneServer {
    seen: Arc<Mutex<Vec<String>>>,
}

impl ServerQuery for OneServer {
    async fn query_info(&self, id: u32, address: &ServerAddress) -> Result<ServerRecord, Error> {
        self.seen.lock().unwrap().push(address.to_string());
        if address.to_string() == "1.2.3.4:7777" {
            let info = decode(b"\\hostname\\Only\\gametype\\TO340\\final\\");
            Ok(ServerRecord::new(id, address.clone(), 42, &info)?)
        } else {
            Err(Error::Timeout)
        }
    }

    async fn query_details(&self, _: &ServerAddress) -> Result<Details, Error> {
        Err(Error::Timeout)
    }
}

#[tokio::test]
async fn master_list_to_callback() {
    init_logger();
    let masters = [
        fake_master("\\ip\\1.2.3.4:7777\\ip\\5.6.7.8:7777\\final\\").await,
        fake_master("\\ip\\5.6.7.8:7777\\ip\\1.2.3.4:7777\\ip\\1.2.3.4:80\\final\\").await,
        dead_master().await,
    ];

    let query = OneServer::default();
    let discovery = DiscoveryBuilder::new().build(query.clone());
    let mut found = Vec::new();
    let summary = discovery
        .run(&masters, |record| found.push(record))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].host_name(), "Only");
    assert_eq!(found[0].game_variant(), GameVariant::TO340);
    assert_eq!(found[0].round_trip(), 42);

    let seen: BTreeSet<String> = query.seen.lock().unwrap().iter().cloned().collect();
    assert_eq!(query.seen.lock().unwrap().len(), 2);
    assert_eq!(
        seen,
        BTreeSet::from(["1.2.3.4:7777".to_owned(), "5.6.7.8:7777".to_owned()])
    );

    assert_eq!(
        summary,
        Summary {
            masters: 3,
            masters_failed: 1,
            candidates: 3,
            rejected: 1,
            queried: 2,
            found: 1,
            timeouts: 1,
            failures: 0,
        }
    );
}

#[tokio::test]
async fn no_masters_reachable() {
    init_logger();
    let masters = [dead_master().await];
    let discovery = DiscoveryBuilder::new().build(OneServer::default());
    let mut count = 0;
    let summary = discovery
        .run(&masters, |_| count += 1)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(count, 0);
    assert_eq!(summary.masters_failed, 1);
    assert_eq!(summary.candidates, 0);
}

/// Tracks the number of queries in flight.
#[derive(Clone, Default)]
struct Counting {
    in_flight: Arc<AtomicUsize>,
    max: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
}

impl ServerQuery for Counting {
    async fn query_info(&self, _: u32, _: &ServerAddress) -> Result<ServerRecord, Error> {
        let n = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(n, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Err(Error::Timeout)
    }

    async fn query_details(&self, _: &ServerAddress) -> Result<Details, Error> {
        Err(Error::Timeout)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_is_bounded() {
    const LIMIT: usize = 16;

    let query = Counting::default();
    let discovery = DiscoveryBuilder::new()
        .max_concurrent(LIMIT)
        .build(query.clone());

    let addresses: Vec<String> = (0..500)
        .map(|i| format!("10.0.{}.{}:7777", i / 250, i % 250))
        .collect();
    let summary = discovery
        .query_addresses(addresses, |_| {})
        .await
        .unwrap()
        .unwrap();

    assert_eq!(summary.queried, 500);
    assert_eq!(summary.timeouts, 500);
    assert_eq!(query.total.load(Ordering::SeqCst), 500);
    assert_eq!(query.in_flight.load(Ordering::SeqCst), 0);
    let max = query.max.load(Ordering::SeqCst);
    assert!(max <= LIMIT, "{max} queries in flight");
    assert!(max >= 1);
}

#[tokio::test]
async fn loopback_servers() {
    init_logger();

    let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = server.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut buf = [0; 512];
        loop {
            let (n, from) = server.recv_from(&mut buf).await.unwrap();
            let answer: &[&[u8]] = match &buf[..n] {
                b"\\info\\" => &[b"\\hostname\\Local\\gametype\\TO220\\numplayers\\1\\final\\"],
                b"\\status\\" => &[b"\\hostname\\Local\\player_0\\Someone"],
                b"\\players\\" => &[b"\\ping_0\\35\\frags_0\\3\\final\\"],
                _ => &[],
            };
            for packet in answer {
                server.send_to(packet, from).await.unwrap();
            }
        }
    });

    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let silent_port = silent.local_addr().unwrap().port();

    let list = format!("\\ip\\127.0.0.1:{port}\\ip\\127.0.0.1:{silent_port}\\final\\");
    let masters = [fake_master(Box::leak(list.into_boxed_str())).await];

    let query = UdpQuery::new()
        .info_timeout(Duration::from_millis(300))
        .packet_gap(Duration::from_millis(150));
    let discovery = DiscoveryBuilder::new().build(query);

    let mut found = Vec::new();
    let summary = discovery
        .run(&masters, |record| found.push(record))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.queried, 2);
    assert_eq!(summary.found, 1);
    assert_eq!(summary.timeouts, 1);

    let mut record = found.pop().unwrap();
    assert_eq!(record.game_variant(), GameVariant::TO220);
    assert!(record.players().is_empty());

    discovery.refresh_one(&mut record).await.unwrap();
    assert_eq!(record.players().len(), 1);
    let player = &record.players()[0];
    assert_eq!(player.name, "Someone");
    assert_eq!(player.ping, 35);
    assert_eq!(player.kills, 3);
    assert_eq!(record.bot_count(), 0);
    drop(silent);
}
