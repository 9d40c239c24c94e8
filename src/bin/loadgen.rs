//! Load generator
//!
//! Opens `--chats` rooms with `--conns` WebSocket clients each. Every
//! client joins its room and sends a chat message at a random 1-6 second
//! interval until `--duration` elapses or Ctrl-C is pressed, then prints
//! send/receive totals.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::task::JoinSet;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use roomcast::{ChatMessage, Envelope, RoomName, Timestamp};

#[derive(Debug, Parser)]
#[command(name = "roomcast-loadgen")]
#[command(about = "Simulate concurrent chat rooms against a roomcast server")]
struct Args {
    /// Server address (host:port)
    #[arg(long, default_value = "localhost:8080")]
    addr: String,

    /// Number of concurrent chats (one room each)
    #[arg(long, default_value_t = 5)]
    chats: usize,

    /// Connections per chat
    #[arg(long, default_value_t = 3)]
    conns: usize,

    /// Simulation length in seconds
    #[arg(long, default_value_t = 30)]
    duration: u64,

    /// Seconds to keep reading after sending stops
    #[arg(long, default_value_t = 5)]
    drain: u64,
}

#[derive(Debug, Default)]
struct Stats {
    sent: AtomicU64,
    received: AtomicU64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("roomcast_loadgen=info")),
        )
        .init();

    let args = Args::parse();
    let started = Instant::now();
    let stats = Arc::new(Stats::default());
    let stop_sending = CancellationToken::new();
    let stop_reading = CancellationToken::new();

    let url = format!("ws://{}/ws", args.addr);
    let mut tasks = JoinSet::new();
    for chat in 0..args.chats {
        let room = RoomName(format!("room_{}", chat));
        for conn in 0..args.conns {
            tasks.spawn(run_connection(
                url.clone(),
                room.clone(),
                format!("Client_{}_{}", chat, conn),
                stats.clone(),
                stop_sending.clone(),
                stop_reading.clone(),
            ));
        }
    }

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(args.duration)) => {
            info!("Simulation duration reached");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C");
        }
    }

    stop_sending.cancel();
    // Wait for lagging messages
    tokio::time::sleep(Duration::from_secs(args.drain)).await;
    stop_reading.cancel();
    while tasks.join_next().await.is_some() {}

    print_stats(&args, &stats, started.elapsed());
    Ok(())
}

async fn run_connection(
    url: String,
    room: RoomName,
    name: String,
    stats: Arc<Stats>,
    stop_sending: CancellationToken,
    stop_reading: CancellationToken,
) {
    let (ws_stream, _) = match connect_async(url.as_str()).await {
        Ok(conn) => conn,
        Err(e) => {
            warn!("{} dial error: {}", name, e);
            return;
        }
    };
    debug!("{} connected to {}", name, url);
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let join = Envelope::Join { room: room.clone() };
    let Ok(json) = join.encode() else {
        return;
    };
    if let Err(e) = ws_sender.send(Message::Text(json.into())).await {
        warn!("{} join error: {}", name, e);
        return;
    }

    let reader_name = name.clone();
    let reader_stats = stats.clone();
    let reader = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                frame = ws_receiver.next() => frame,
                _ = stop_reading.cancelled() => break,
            };
            match frame {
                Some(Ok(Message::Text(text))) => {
                    reader_stats.received.fetch_add(1, Ordering::Relaxed);
                    debug!("{} received: {}", reader_name, text);
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("{} read error: {}", reader_name, e);
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            _ = tokio::time::sleep(next_delay()) => {}
            _ = stop_sending.cancelled() => break,
        }

        let mut chat = ChatMessage::new(
            room.clone(),
            format!("Message from {} at {}", name, chrono::Utc::now()),
            name.clone(),
        );
        chat.timestamp = Some(Timestamp::now());
        let Ok(json) = Envelope::Chat(chat).encode() else {
            continue;
        };
        if let Err(e) = ws_sender.send(Message::Text(json.into())).await {
            warn!("{} write error: {}", name, e);
            break;
        }
        stats.sent.fetch_add(1, Ordering::Relaxed);
    }

    let _ = reader.await;
    let _ = ws_sender.close().await;
}

fn next_delay() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(1000..6000))
}

fn print_stats(args: &Args, stats: &Stats, elapsed: Duration) {
    let sent = stats.sent.load(Ordering::Relaxed);
    let received = stats.received.load(Ordering::Relaxed);
    let secs = elapsed.as_secs_f64().max(f64::EPSILON);

    println!();
    println!("--- Final Statistics ---");
    println!("Duration: {:.1?}", elapsed);
    println!("Total Chats: {}", args.chats);
    println!("Connections per Chat: {}", args.conns);
    println!("Total Connections: {}", args.chats * args.conns);
    println!("Messages Sent: {}", sent);
    println!("Messages Received: {}", received);
    println!("Send Rate: {:.2} messages/second", sent as f64 / secs);
    println!("Receive Rate: {:.2} messages/second", received as f64 / secs);
}
