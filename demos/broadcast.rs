//! # Example: periodic broadcast into a fake chat platform
//!
//! Two groups deliver into an in-memory directory. One channel starts refusing
//! deliveries halfway through and is pruned; the rest keep receiving.
//!
//! Run with `RUST_LOG=relaycast=debug cargo run --example broadcast`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing_subscriber::EnvFilter;

use relaycast::{
    AutoGroup, Channel, ChannelId, ChannelKind, Config, ContentSource, DeliveryFailure,
    Destinations, Directory, Engine, Group, ItemSpec, Payload, Period, RemoveAfter, SendableItem,
    Server, ServerId, Session, Transport,
};

struct Platform {
    servers: Vec<Server>,
    channels: Vec<Channel>,
}

impl Platform {
    fn new() -> Self {
        let server = |id, name: &str| Server {
            id: ServerId(id),
            name: name.into(),
        };
        let text = |id, name: &str, s| Channel {
            id: ChannelId(id),
            name: name.into(),
            kind: ChannelKind::Text,
            server: ServerId(s),
        };
        Self {
            servers: vec![
                server(1, "home"),
                server(2, "alpha-main"),
                server(3, "alpha-test"),
            ],
            channels: vec![
                text(10, "general", 1),
                text(11, "announcements", 1),
                text(20, "general", 2),
                text(30, "general", 3),
            ],
        }
    }
}

impl Directory for Platform {
    fn servers(&self) -> Vec<Server> {
        self.servers.clone()
    }

    fn channels(&self, server: ServerId, kind: Option<ChannelKind>) -> Vec<Channel> {
        self.channels
            .iter()
            .filter(|c| c.server == server && kind.is_none_or(|k| c.kind == k))
            .cloned()
            .collect()
    }

    fn channel(&self, id: ChannelId) -> Option<Channel> {
        self.channels.iter().find(|c| c.id == id).cloned()
    }
}

/// Prints deliveries; channel 11 is locked once `locked` flips.
#[derive(Default)]
struct Console {
    locked: AtomicBool,
}

#[async_trait]
impl Transport for Console {
    async fn send(
        &self,
        _session: &mut Session,
        channel: &Channel,
        payload: &Payload,
    ) -> Result<(), DeliveryFailure> {
        if channel.id == ChannelId(11) && self.locked.load(Ordering::Relaxed) {
            return Err(DeliveryFailure::PermissionDenied("channel locked".into()));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        println!("[{}/{}] {:?}", channel.server, channel.name, payload);
        Ok(())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let transport = Arc::new(Console::default());
    let engine = Engine::builder(Config::default(), transport.clone(), Arc::new(Platform::new()))
        .build();

    let news = SendableItem::new(ItemSpec::text(
        "Scheduled announcement",
        Period::new(Some(Duration::from_secs(1)), Duration::from_secs(2))?,
        Destinations::fixed([ChannelId(10), ChannelId(11)]),
    ));
    let home = Arc::new(
        Group::new(ServerId(1))
            .with_items(vec![news.clone()])
            .with_logging(true),
    );
    engine.add_group(home.clone()).await?;

    let counter = Arc::new(AtomicU32::new(0));
    let ticker = {
        let counter = counter.clone();
        ContentSource::producer(move || {
            let n = counter.fetch_add(1, Ordering::Relaxed);
            Some(Payload::Text(format!("tick #{n}")))
        })
    };
    let pings = SendableItem::new(
        ItemSpec::new(
            ChannelKind::Text,
            ticker,
            Period::fixed(Duration::from_millis(1500)),
            Destinations::matching("general")?,
        )
        .with_remove_after(RemoveAfter::Sends(4)),
    );
    let alpha = Arc::new(
        AutoGroup::new("alpha")
            .with_exclude("test")
            .with_items(vec![pings]),
    );
    engine.add_group(alpha.clone()).await?;

    tokio::time::sleep(Duration::from_secs(4)).await;
    println!("-- locking channel 11");
    transport.locked.store(true, Ordering::Relaxed);

    tokio::time::sleep(Duration::from_secs(4)).await;
    let left: Vec<_> = news.destinations().iter().map(|c| c.name.clone()).collect();
    println!("-- news destinations left: {left:?}");
    println!("-- alpha items left: {}, removed: {}", alpha.items().len(), alpha.removed_items().len());

    engine.close().await;
    Ok(())
}
