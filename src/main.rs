use std::env;
use std::fs;
use std::process::exit;
use std::thread;
use std::time::{Duration, Instant};

use nix::unistd::{daemon as daemonize, fork, ForkResult};

mod client;
mod config;
mod daemon;
mod handler;
mod message;
mod model;
mod repository;
mod service;
#[cfg(test)]
mod test;
mod util;

use client::Client;
use daemon::DaemonOptions;

const USAGE: &str = "\
TaggableFS

  --help
        display this.
  --log
        log messages to ROOT_DIRECTORY/metadata/log.txt.
  --tag-view
        open filesystem in read-only mode to browse tags.
  --init MOUNT_POINT ROOT_DIRECTORY
        launch the daemon serving the filesystem mounted at the given mount
        point; files are stored in the root directory.
  --shutdown
        shutdown the daemon.
  --tag MOUNTED_PATH TAG
        tag the file referenced by mounted path (not in tag view) with the
        given tag which will be created if not found. If the path refers to
        a folder, all files in it are tagged (non-recursive).
  --untag MOUNTED_PATH TAG
        untag the file referenced by mounted path (not in tag view) if
        tagged with the given tag. If the path refers to a folder, all files
        in it are untagged (non-recursive).
  --nest TAG PARENT_TAG
        nest the given tag inside the given parent tag if both are valid.
  --unnest TAG PARENT_TAG
        unnest the given tag from the given parent tag if both are valid.
  --stats
        display stats regarding the mounted filesystem.
  --search-tags TAG_1 TAG_2 ... TAG_N [--strict]
        search for tagged files with any of the given tags
        or with all of them if --strict option is used.
  --create-tag TAG
        create tag with no children.
  --delete-tag TAG
        delete tag if it has no children.
  --get-tags FILE_PATH
        display all tags currently used to tag the file.
";

fn main() {
    let mut args: Vec<String> = env::args().collect();
    let enable_logging = take_flag(&mut args, "--log");
    let tag_view = take_flag(&mut args, "--tag-view");

    let Some(command) = args.get(1).cloned() else {
        eprintln!("ERROR: Invalid command and arguments. Use --help to see commands.");
        exit(1);
    };
    let arguments = &args[2..];

    let code = match command.as_str() {
        "--help" => {
            println!("{USAGE}");
            0
        }
        "--init" => init(arguments, enable_logging, tag_view),
        "--shutdown" => shutdown(arguments),
        "--tag" => two_arg_query(arguments, "QH_TAG"),
        "--untag" => two_arg_query(arguments, "QH_UNTAG"),
        "--nest" => two_arg_query(arguments, "QH_NEST"),
        "--unnest" => two_arg_query(arguments, "QH_UNNEST"),
        "--stats" => stats(arguments),
        "--search-tags" => search_tags(arguments),
        "--create-tag" => one_arg_query(arguments, "QH_CREATE_TAG"),
        "--delete-tag" => one_arg_query(arguments, "QH_DELETE_TAG"),
        "--get-tags" => get_tags(arguments),
        _ => {
            eprintln!("ERROR: Invalid command and arguments. Use --help to see commands.");
            1
        }
    };
    exit(code);
}

fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    match args.iter().position(|arg| arg == flag) {
        Some(position) => {
            args.remove(position);
            true
        }
        None => false,
    }
}

/// launches the daemon: forks, detaches the child into the manager loop, and
/// confirms from the parent that the queues came up and answer the handshake
fn init(arguments: &[String], enable_logging: bool, tag_view: bool) -> i32 {
    if arguments.len() != 2 {
        eprintln!("ERROR: Invalid arguments.");
        return 1;
    }
    match Client::connect() {
        Some(client) if client.is_responding() => {
            eprintln!("ERROR: TaggableFS is already running.");
            return 1;
        }
        Some(_) => {
            eprintln!("ERROR: TaggableFS not shutdown properly or running but not responsive.");
            return 1;
        }
        None => {}
    }
    let (Ok(mount_point), Ok(root_directory)) =
        (fs::canonicalize(&arguments[0]), fs::canonicalize(&arguments[1]))
    else {
        eprintln!("ERROR: Invalid mount point and/or root directory.");
        return 1;
    };

    println!("Initializing TaggableFS...");
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            // detach from the terminal before serving
            let _ = daemonize(true, false);
            daemon::start(DaemonOptions {
                mount_point,
                root_directory,
                enable_logging,
                tag_view,
            });
        }
        Ok(ForkResult::Parent { .. }) => {}
        Err(e) => {
            eprintln!("ERROR: fork() failed: {e}");
            return 1;
        }
    }

    // give the child a moment to bring the queues up, then handshake
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(client) = Client::connect() {
            if client.is_responding() {
                println!("TaggableFS initialized.");
                return 0;
            }
        }
        if Instant::now() >= deadline {
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }
    eprintln!("ERROR: TaggableFS could not be initialized.");
    1
}

fn shutdown(arguments: &[String]) -> i32 {
    if !arguments.is_empty() {
        eprintln!("ERROR: Invalid arguments.");
        return 1;
    }
    let Some(client) = Client::connect() else {
        eprintln!("ERROR: Message queues don't exist.");
        println!("TaggableFS might have already been shutdown.");
        return 0;
    };
    if client.is_responding() && client.send_with_timeout("QH_EXIT").is_ok() {
        println!("Request to shutdown sent.");
        return 0;
    }
    println!("TaggableFS hanging or not shutdown properly.");
    daemon::unlink_queues();
    println!("Cleaned up mqueues.");
    1
}

fn connected_client() -> Client {
    match Client::connect() {
        Some(client) if client.is_responding() => client,
        _ => {
            eprintln!("ERROR: TaggableFS not running or unreachable.");
            exit(1);
        }
    }
}

fn run_query(request: String) -> Vec<String> {
    let client = connected_client();
    match client.query(&request) {
        Ok(response) => response,
        Err(e) => {
            eprintln!("ERROR: Query failed: {e}");
            exit(1);
        }
    }
}

fn two_arg_query(arguments: &[String], verb: &str) -> i32 {
    if arguments.len() != 2 {
        eprintln!("ERROR: Invalid arguments.");
        return 1;
    }
    let response = run_query(format!("{verb} {},{}", arguments[0], arguments[1]));
    println!("RESPONSE: {}", response[0]);
    0
}

fn one_arg_query(arguments: &[String], verb: &str) -> i32 {
    if arguments.len() != 1 {
        eprintln!("ERROR: Invalid arguments.");
        return 1;
    }
    let response = run_query(format!("{verb} {}", arguments[0]));
    println!("RESPONSE: {}", response[0]);
    0
}

fn stats(arguments: &[String]) -> i32 {
    if !arguments.is_empty() {
        eprintln!("ERROR: Invalid arguments.");
        return 1;
    }
    let response = run_query("QH_STATS".to_string());
    println!("RESPONSE: {}", response[0]);
    0
}

fn search_tags(arguments: &[String]) -> i32 {
    let mut tags: Vec<String> = arguments.to_vec();
    let strict = take_strict_flag(&mut tags);
    if tags.is_empty() {
        eprintln!("ERROR: No tags given.");
        return 1;
    }
    let request = format!(
        "QH_SEARCH {},{}",
        if strict { 1 } else { 0 },
        util::serialize_ids(&tags, ';')
    );
    let response = run_query(request);
    println!(
        "SEARCH RESULTS (Strict Search: {}):",
        if strict { "ON" } else { "OFF" }
    );
    if response[0].is_empty() {
        println!("No files Found");
    } else {
        for result in response {
            println!("{result}");
        }
    }
    0
}

fn take_strict_flag(tags: &mut Vec<String>) -> bool {
    match tags.iter().position(|tag| tag == "--strict") {
        Some(position) => {
            tags.remove(position);
            true
        }
        None => false,
    }
}

fn get_tags(arguments: &[String]) -> i32 {
    if arguments.len() != 1 {
        eprintln!("ERROR: Invalid arguments.");
        return 1;
    }
    let response = run_query(format!("QH_GET_TAGS {}", arguments[0]));
    if response[0] == "Invalid" {
        eprintln!("ERROR: Invalid path given.");
        return 1;
    }
    let tags = util::deserialize_ids(&response[0], ';');
    println!("TAGS:");
    if tags.is_empty() {
        println!("No Tags Found");
    }
    for tag in tags {
        println!("{tag}");
    }
    0
}
