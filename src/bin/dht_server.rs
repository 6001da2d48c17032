//! Server for the distributed hash table.
//!
//! usage: dht_server myIp numRoutes cfgFile [ cache ] [ debug ] [ predFile ]
//!
//! The server binds a UDP socket on myIp, writes "ip port" to cfgFile,
//! and joins the ring through the server named in predFile when one is
//! given. "cache" enables the relay cache; "debug" prints every packet
//! sent and received. The server runs until its console sees "leave",
//! "quit", or end of input, then departs the ring gracefully.

#[macro_use]
extern crate log;
extern crate ringnet;
extern crate simplelog;

use std::io;
use std::io::BufRead;
use std::net::IpAddr;
use std::process;

use simplelog::{CombinedLogger, Config, LogLevel, LogLevelFilter, TermLogger};

use ringnet::dht::DhtNode;

fn usage() -> ! {
    eprintln!("usage: dht_server myIp numRoutes cfgFile [ cache ] [ debug ] [ predFile ]");
    process::exit(1);
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        usage();
    }
    let my_ip: IpAddr = match args[1].parse() {
        Ok(ip) => ip,
        Err(_) => usage(),
    };
    let num_routes: usize = match args[2].parse() {
        Ok(n) => n,
        Err(_) => usage(),
    };
    let cfg_file = &args[3];
    let mut cache_on = false;
    let mut debug = false;
    let mut pred_file = None;
    for arg in &args[4..] {
        if arg == "cache" {
            cache_on = true;
        } else if arg == "debug" {
            debug = true;
        } else {
            pred_file = Some(arg.as_str());
        }
    }

    let logger_config = Config {
        time: Some(LogLevel::Error),
        level: Some(LogLevel::Error),
        target: None,
        location: None,
    };
    let level = if debug {
        LogLevelFilter::Debug
    } else {
        LogLevelFilter::Info
    };
    CombinedLogger::init(vec![TermLogger::new(level, logger_config).unwrap()]).unwrap();

    let node = match DhtNode::new(my_ip, num_routes, cfg_file, cache_on, pred_file) {
        Ok(node) => node,
        Err(e) => {
            eprintln!("dht_server: {}", e);
            process::exit(1);
        }
    };
    info!("serving at {}", node.local_adr());

    // run until the console closes or asks us to go
    let input = io::stdin();
    for line in input.lock().lines() {
        match line {
            Ok(cmd) => {
                let cmd = cmd.trim();
                if cmd == "leave" || cmd == "quit" {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    node.stop();
}
