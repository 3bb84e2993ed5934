use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::exit;

use nix::mqueue::MQ_OFlag;
use nix::sys::stat::{umask, Mode};

use crate::config::TAGGABLE_FS_CONFIG;
use crate::handler::{Dispatcher, Outcome, Target};
use crate::message::MessageQueue;
use crate::repository;
use crate::service::object_store::ObjectStore;

pub struct DaemonOptions {
    pub mount_point: PathBuf,
    pub root_directory: PathBuf,
    pub enable_logging: bool,
    pub tag_view: bool,
}

/// Runs the TaggableFS manager until an `EXIT` request arrives from either
/// request source, then snapshots the index, removes the queues and exits.
/// Every initialization failure here is fatal: the daemon never serves with a
/// partial index or a partial channel topology.
pub fn start(options: DaemonOptions) -> ! {
    let metadata_dir = options.root_directory.join("metadata");
    if let Err(e) = fs::create_dir_all(&metadata_dir) {
        eprintln!("ERROR: Unable to create metadata directory: {e}");
        exit(1);
    }
    init_logging(&metadata_dir, options.enable_logging);
    log::info!(
        "TaggableFS starting, root {} mounted at {} ({})",
        options.root_directory.display(),
        options.mount_point.display(),
        if options.tag_view { "tag view" } else { "folder view" },
    );

    let config = &*TAGGABLE_FS_CONFIG;
    // clear the umask around creation so the queues get exactly 0660
    let previous_mask = umask(Mode::empty());
    let created = (
        MessageQueue::create(&config.queues.fuse, MQ_OFlag::O_WRONLY),
        MessageQueue::create(&config.queues.query, MQ_OFlag::O_WRONLY),
        MessageQueue::create(&config.queues.manager, MQ_OFlag::O_RDONLY),
    );
    umask(previous_mask);
    let (tx_fuse, tx_query, rx) = match created {
        (Ok(tx_fuse), Ok(tx_query), Ok(rx)) => (tx_fuse, tx_query, rx),
        (fuse, query, manager) => {
            log::error!(
                "Failed to create message queues (another daemon running?): \
                 fuse={fuse:?} query={query:?} manager={manager:?}",
                fuse = fuse.as_ref().err(),
                query = query.as_ref().err(),
                manager = manager.as_ref().err(),
            );
            unlink_queues();
            exit(1);
        }
    };

    let db_path = metadata_dir.join("fs.db");
    let con = match repository::open_metadata_db(&db_path) {
        Ok(con) => con,
        Err(e) => {
            log::error!(
                "Failed to load metadata index from {}! Error is {e:?}",
                db_path.display()
            );
            unlink_queues();
            exit(1);
        }
    };
    let store = ObjectStore::new(options.root_directory.clone());
    let mut dispatcher = Dispatcher::new(con, store, options.tag_view);

    loop {
        let message = match rx.receive() {
            Ok(message) => message,
            Err(e) => {
                log::error!("Failed to receive from the inbound queue: {e}");
                unlink_queues();
                exit(1);
            }
        };
        log::info!("MESSAGE: {}", message.content);
        match dispatcher.dispatch(&message.content) {
            Outcome::Reply(target, frames) => {
                let queue = match target {
                    Target::FileSystem => &tx_fuse,
                    Target::Query => &tx_query,
                };
                send_frames(queue, &frames);
            }
            Outcome::Ignore => {}
            Outcome::Exit => break,
        }
    }

    let (con, _) = dispatcher.into_parts();
    let snapshot = repository::save_snapshot(&con, &db_path);
    let _ = tx_fuse.close();
    let _ = tx_query.close();
    let _ = rx.close();
    unlink_queues();
    if let Err(e) = snapshot {
        log::error!(
            "Failed to snapshot the metadata index to {}! Error is {e:?}",
            db_path.display()
        );
        exit(1);
    }
    log::info!("TaggableFS exiting");
    exit(0);
}

/// one reply is one or more frames; only the final frame carries the
/// complete marker, so the receiver knows when to stop accumulating
fn send_frames(queue: &MessageQueue, frames: &[String]) {
    let last = frames.len().saturating_sub(1);
    for (index, frame) in frames.iter().enumerate() {
        if let Err(e) = queue.send(frame, index == last) {
            log::error!("Failed to send reply frame: {e}");
            return;
        }
    }
}

/// removes all three queue names; safe to call when some never existed
pub fn unlink_queues() {
    let config = &*TAGGABLE_FS_CONFIG;
    for name in [
        &config.queues.fuse,
        &config.queues.query,
        &config.queues.manager,
    ] {
        let _ = MessageQueue::unlink(name);
    }
}

fn init_logging(metadata_dir: &Path, enabled: bool) {
    if enabled {
        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(metadata_dir.join("log.txt"));
        match log_file {
            Ok(file) => {
                env_logger::Builder::from_env(
                    env_logger::Env::default().default_filter_or("info"),
                )
                .target(env_logger::Target::Pipe(Box::new(file)))
                .init();
            }
            Err(e) => {
                eprintln!("ERROR: Unable to create/open log file: {e}");
                exit(1);
            }
        }
    } else {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }
}
