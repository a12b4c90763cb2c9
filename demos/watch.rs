//! Prints chat from some channels, reconnecting when the connection drops.
//!
//! ```text,ignore
//! $ cargo run --example watch -- --channel #forsen --channel #pajlada
//! ```

use anyhow::Result;
use clap::Parser;
use nmb_tmi::client::{connect_with_retry, DEFAULT_BACKOFF};
use nmb_tmi::{Config, Event};

#[derive(Parser)]
#[command(author, version)]
struct Args {
  /// Channels to join
  #[arg(long)]
  channel: Vec<String>,

  /// Path to a JSON config file
  #[arg(long)]
  config: Option<std::path::PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let config: Config = match &args.config {
    Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
    None => Config::default(),
  };

  loop {
    let mut backoff = DEFAULT_BACKOFF;
    let (client, mut events) = connect_with_retry(config.clone(), &mut backoff).await?;
    client.join_all(&args.channel)?;

    loop {
      tokio::select! {
        _ = tokio::signal::ctrl_c() => {
          client.close();
          client.closed().await;
          return Ok(());
        }
        event = events.recv() => match event {
          Some(Event::Chat { channel, user, text, .. }) => println!("#{channel} {user}: {text}"),
          Some(Event::Latency(latency)) => println!("latency: {}ms", latency.as_millis()),
          Some(Event::Reconnect(_)) => {
            println!("server restarting, reconnecting");
            client.close();
          }
          Some(Event::Disconnected(error)) => {
            if let Some(error) = error {
              println!("disconnected: {error}");
            }
            break;
          }
          Some(_) => {}
          None => break,
        }
      }
    }
  }
}
