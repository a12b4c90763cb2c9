//! Replies `yo` to `!yo`.
//!
//! ```text,ignore
//! $ cargo run --example echo -- \
//!   --nick your_bot \
//!   --token oauth:yfvzjqb705z12hrhy1zkwa9xt7v662 \
//!   --channel #forsen
//! ```

use anyhow::Result;
use clap::Parser;
use nmb_tmi::{Client, Credentials, Event};

#[derive(Parser)]
#[command(author, version)]
struct Args {
  /// Login name of the bot account
  #[arg(long)]
  nick: String,

  /// Login oauth2 token
  #[arg(long)]
  token: String,

  /// Channels to join
  #[arg(long)]
  channel: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let (client, mut events) = Client::builder()
    .credentials(Credentials::new(args.nick, args.token))
    .connect()
    .await?;
  client.join_all(&args.channel)?;

  loop {
    tokio::select! {
      _ = tokio::signal::ctrl_c() => {
        client.close();
        break;
      }
      event = events.recv() => match event {
        Some(Event::Chat { channel, user, text, message }) => {
          println!("#{channel} {user}: {text}");
          if !text.starts_with("!yo") {
            continue;
          }
          match message.tag("id") {
            Some(id) => client.reply(&channel, id, "yo")?,
            None => client.chat(&channel, "yo")?,
          }
          println!("< #{channel} yo");
        }
        Some(Event::Disconnected(error)) => {
          if let Some(error) = error {
            anyhow::bail!(error);
          }
          break;
        }
        Some(_) => {}
        None => break,
      }
    }
  }

  client.closed().await;
  Ok(())
}
