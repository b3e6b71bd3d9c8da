mod bench;
mod board;
mod book;
mod eval;
mod exporter;
mod search;
mod stats;
mod tablebase;
mod transposition;
mod uci;

use std::env;

fn main() {
    env_logger::Builder::from_default_env().format_timestamp(None).init();

    if env::args().any(|x| x == *"bench") {
        bench::bench();
    } else {
        uci::main_loop();
    }
}
