//! Control-plane propagation: `set_subscription`/`set_path` changes reach
//! every live connection as a `Topology` message, and a peer's `finish()`
//! is observed as a terminal (`None`) topology notification on each
//! connection.

mod support;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use meshlink::link::LinkBuilder;
use meshlink::message::{Path, Subscription, Topology};
use meshlink::transport::ConnectionId;
use support::connect;

const CONNECTIONS: usize = 5;

/// Collects every `(ConnectionId, Option<Topology>)` a link's `topology_fn`
/// observes, in arrival order.
#[derive(Default, Clone)]
struct TopologyLog(Arc<Mutex<Vec<(ConnectionId, Option<Topology>)>>>);

impl TopologyLog {
    fn install(builder: LinkBuilder) -> (LinkBuilder, Self) {
        let log = TopologyLog::default();
        let recorded = log.0.clone();
        (
            builder.topology_fn(move |id, topology| {
                recorded.lock().unwrap().push((id, topology));
            }),
            log,
        )
    }

    fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    fn count_subscription(&self, channels: &[u32]) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, t)| match t {
                Some(t) => t
                    .subscription
                    .iter()
                    .any(|s| s.channel.as_slice() == channels),
                None => false,
            })
            .count()
    }

    fn count_path(&self, expected: &Path) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, t)| match t {
                Some(t) => t.path.iter().any(|p| p == expected),
                None => false,
            })
            .count()
    }

    fn count_terminal(&self) -> usize {
        self.0.lock().unwrap().iter().filter(|(_, t)| t.is_none()).count()
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn subscription_and_path_updates_propagate_to_every_connection() {
    let (client_builder, client_log) = TopologyLog::install(LinkBuilder::new());
    let (server_builder, server_log) = TopologyLog::install(LinkBuilder::new());
    let client = client_builder.build();
    let server = server_builder.build();

    let mut client_handles = Vec::new();
    let mut server_handles = Vec::new();
    for _ in 0..CONNECTIONS {
        let (c, s) = connect(client.clone(), server.clone()).await;
        client_handles.push(c);
        server_handles.push(s);
    }
    settle().await;

    client.set_subscription(vec![Subscription { channel: vec![5] }]);
    settle().await;
    assert_eq!(
        server_log.count_subscription(&[5]),
        CONNECTIONS,
        "every connection's reader on the server should see the new subscription exactly once"
    );

    let path = Path {
        metric: 1000,
        site: vec![5],
    };
    server.set_path(vec![path.clone()]);
    settle().await;
    assert_eq!(
        client_log.count_path(&path),
        CONNECTIONS,
        "every connection's reader on the client should see the new path exactly once"
    );

    client.finish().expect("client finish succeeds");
    settle().await;
    assert_eq!(
        server_log.count_terminal(),
        CONNECTIONS,
        "server should see a terminal topology notification per connection once the client finishes"
    );

    server.finish().expect("server finish succeeds");
    settle().await;
    assert_eq!(
        client_log.count_terminal(),
        CONNECTIONS,
        "client should see a terminal topology notification per connection once the server finishes"
    );

    for handle in client_handles {
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
    }
    for handle in server_handles {
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
    }

    assert!(client_log.len() >= CONNECTIONS, "client log should at least cover the opening handshake topology per connection");
}
