//! Client for the distributed hash table.
//!
//! usage: dht_client myIp serverCfgFile cmd [ key ] [ value ]
//!
//! Reads the server's address from its config file, sends one get or
//! put, and prints the reply. A put without a value removes the key.

extern crate ringnet;
extern crate simplelog;

use std::net::IpAddr;
use std::process;

use simplelog::{CombinedLogger, Config, LogLevel, LogLevelFilter, TermLogger};

use ringnet::dht;
use ringnet::dht::client;
use ringnet::dht::packet::DhtPayload;

fn usage() -> ! {
    eprintln!("usage: dht_client myIp serverCfgFile cmd [ key ] [ value ]");
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

    // the client always shows its packet traffic
    let logger_config = Config {
        time: Some(LogLevel::Error),
        level: Some(LogLevel::Error),
        target: None,
        location: None,
    };
    CombinedLogger::init(vec![
        TermLogger::new(LogLevelFilter::Debug, logger_config).unwrap(),
    ])
    .unwrap();

    let server = match dht::read_cfg(&args[2]) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("dht_client: {}", e);
            process::exit(1);
        }
    };

    let key = args.get(4).cloned();
    let value = args.get(5).cloned();
    let payload = match args[3].as_str() {
        "get" => match key {
            Some(key) => DhtPayload::Get { key: key },
            None => usage(),
        },
        "put" => match key {
            Some(key) => DhtPayload::Put {
                key: key,
                value: value,
            },
            None => usage(),
        },
        _ => usage(),
    };

    match client::request(my_ip, server, payload) {
        Ok(reply) => {
            print!("{}", reply.to_wire());
        }
        Err(e) => {
            eprintln!("dht_client: {}", e);
            process::exit(1);
        }
    }
}
