//! Decode a telemetry line and print the pinned mix the tuner would search under.
//!
//! ```text
//! cargo run -p mt-types --example decode_telemetry -- "10,0,0,0,10,0;100,,,,200,"
//! ```

use mt_types::wire::{self, Message};
use mt_types::{Configuration, MemtableVariant, OpKind};

fn main() {
    let line = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "40,10,0,0,50,0;120,80:95::::60,61,70:".to_string());

    match wire::decode(&line) {
        Ok(Message::Telemetry(workload)) => {
            println!("total ops:     {}", workload.total_ops());
            println!("total latency: {} ns", workload.total_latency());
            match workload.percentages() {
                Ok(pct) => {
                    for (op, share) in pct.iter_space_order() {
                        println!("  {:<13} {share:.1}", op.name());
                    }
                }
                Err(e) => println!("mix: {e}"),
            }
            println!("  {} samples for {}", workload.latencies(OpKind::Insert).len(), OpKind::Insert);
        }
        Ok(Message::Terminate) => println!("termination token"),
        Err(e) => println!("error: {e}"),
    }

    let reply = Configuration::sized(MemtableVariant::Vector, 24);
    println!("example reply: {}", wire::encode_configuration(&reply));
}
