mod replay;

use std::{
  path::PathBuf,
  sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
  },
};

use anyhow::{Context, Result};
use lib_interactivity::{
  init_tracing, Director, Room, RoomEvent, RoomEventKind, SourceIdentifier, SourceType,
  StreamInformation, WatchOptions,
};
use structopt::StructOpt;
use tokio::io::AsyncReadExt;
use tracing::{error, info};

use crate::replay::{parse_events, ReplayEngine};

#[derive(Debug, Clone, StructOpt)]
#[structopt(
  name = "interactivity",
  about = "Inspect multi-publisher rooms and their source identifiers."
)]
struct Opt {
  #[structopt(short, long, parse(from_occurrences))]
  verbose: u8,
  #[structopt(subcommand)]
  command: Command,
}

#[derive(Debug, Clone, StructOpt)]
enum Command {
  /// Print the source id announced for a publisher's source.
  Encode {
    #[structopt(long)]
    publisher_name: String,
    #[structopt(long, default_value = "camera")]
    source_type: SourceType,
    /// Defaults to the source type.
    #[structopt(long)]
    source_name: Option<String>,
  },
  /// Print the publisher name, source type and source name behind a source id.
  Decode { source_id: String },
  /// Ask the directory for the signalling endpoint of a stream.
  Resolve {
    #[structopt(long)]
    stream_name: String,
    #[structopt(long)]
    stream_account_id: String,
    #[structopt(long)]
    subscriber_token: Option<String>,
    #[structopt(long, default_value = "https://director.millicast.com")]
    director_url: String,
  },
  /// Feed recorded broadcast notifications (one JSON object per line) through a room.
  Replay {
    #[structopt(long, default_value = "replay")]
    stream_name: String,
    #[structopt(long, default_value = "replay")]
    stream_account_id: String,
    /// Bind every added source to the replayed viewer session.
    #[structopt(long)]
    receive: bool,
    /// Reads standard input when omitted.
    #[structopt(parse(from_os_str))]
    input: Option<PathBuf>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let opt = Opt::from_args();

  init_tracing(match opt.verbose {
    0 => tracing::Level::INFO,
    1 => tracing::Level::DEBUG,
    _ => tracing::Level::TRACE,
  });

  main_inner(opt.command).await
}

async fn main_inner(command: Command) -> Result<()> {
  match command {
    Command::Encode {
      publisher_name,
      source_type,
      source_name,
    } => {
      let source_name = source_name.unwrap_or_else(|| source_type.to_string());
      let identifier = SourceIdentifier::new(&publisher_name, source_type, &source_name);
      println!("{}", identifier);
    },
    Command::Decode { source_id } => {
      let identifier = SourceIdentifier::from_source_id(&source_id);
      println!("publisher name: {}", identifier.publisher_name());
      println!("source type:    {}", identifier.source_type());
      println!("source name:    {}", identifier.source_name());
    },
    Command::Resolve {
      stream_name,
      stream_account_id,
      subscriber_token,
      director_url,
    } => {
      let credentials = Director::new(director_url)
        .subscriber(&stream_name, &stream_account_id, subscriber_token.as_deref())
        .await
        .context("failed to resolve stream")?;
      for url in &credentials.urls {
        println!("{}", url);
      }
      println!("{}", credentials.signalling_url()?);
    },
    Command::Replay {
      stream_name,
      stream_account_id,
      receive,
      input,
    } => replay(&stream_name, &stream_account_id, receive, input).await?,
  }
  Ok(())
}

async fn replay(
  stream_name: &str,
  stream_account_id: &str,
  receive: bool,
  input: Option<PathBuf>,
) -> Result<()> {
  let recording = match input {
    Some(path) => tokio::fs::read_to_string(&path)
      .await
      .with_context(|| format!("failed to read {}", path.display()))?,
    None => {
      let mut buf = String::new();
      tokio::io::stdin()
        .read_to_string(&mut buf)
        .await
        .context("failed to read standard input")?;
      buf
    },
  };
  let events = parse_events(&recording);
  info!("{} notifications to replay", events.len());

  let room = Room::new(
    Arc::new(ReplayEngine::new(events)),
    StreamInformation::new(stream_name, stream_account_id),
  )?;

  let viewers = Arc::new(AtomicU64::new(0));
  room
    .on(RoomEventKind::PublisherJoined, |event: &RoomEvent| {
      if let RoomEvent::PublisherJoined(publisher) = event {
        println!("joined   {}", publisher.name());
      }
    })
    .on(RoomEventKind::PublisherLeft, |event: &RoomEvent| {
      if let RoomEvent::PublisherLeft(publisher) = event {
        println!("left     {}", publisher.name());
      }
    })
    .on(RoomEventKind::SourceAdded, move |event: &RoomEvent| {
      if let RoomEvent::SourceAdded(publisher, source) = event {
        let identifier = source.identifier();
        println!(
          "added    {} {} {:?}",
          publisher.name(),
          identifier.source_type(),
          identifier.source_name()
        );
        if receive {
          let source = source.clone();
          tokio::spawn(async move {
            if let Err(e) = source.receive().await {
              error!("failed to receive {}: {:?}", source.identifier(), e);
            }
          });
        }
      }
    })
    .on(RoomEventKind::SourceRemoved, |event: &RoomEvent| {
      if let RoomEvent::SourceRemoved(publisher, identifier) = event {
        println!(
          "removed  {} {} {:?}",
          publisher.name(),
          identifier.source_type(),
          identifier.source_name()
        );
      }
    })
    .on(RoomEventKind::ViewerCount, {
      let viewers = viewers.clone();
      move |event: &RoomEvent| {
        if let RoomEvent::ViewerCount(count) = event {
          viewers.store(*count, Ordering::SeqCst);
          println!("viewers  {}", count);
        }
      }
    });

  room.watch(&WatchOptions::default()).await?;
  room.disconnected().await?;

  let publishers = room.publishers().await;
  println!(
    "{} publisher(s) still live, last viewer count {}",
    publishers.len(),
    viewers.load(Ordering::SeqCst)
  );
  for publisher in publishers {
    let mut names: Vec<_> = publisher
      .sources()
      .iter()
      .map(|source| source.identifier().source_name().to_owned())
      .collect();
    names.sort();
    println!("  {}: {}", publisher.name(), names.join(", "));
  }

  room.leave().await;
  Ok(())
}
