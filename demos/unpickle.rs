// Copyright (c) 2024 The brine developers.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! A simple example executable that decodes pickle streams to demonstrate
//! the library's features.

use std::env;
use std::error::Error;
use std::fs::File;
use std::io::{stdin, Read};
use std::process::exit;

use serde_json as json;

fn main() -> Result<(), Box<dyn Error>> {
    let args = env::args().collect::<Vec<_>>();
    if args.len() < 2 {
        println!("Usage: unpickle (decode | display | to_json) [filename]");
        println!();
        println!("Input is either given file or stdin.");
        println!("decode:  decode and debug-print the pickle");
        println!("display: decode and pretty-print the pickle");
        println!("to_json: decode and jsonify the pickle");
        exit(1);
    }

    let reader: Box<dyn Read> = if args.len() == 3 {
        Box::new(File::open(&args[2])?)
    } else {
        Box::new(stdin())
    };

    match &*args[1] {
        "decode" => {
            let decoded = brine::value_from_reader(reader, Default::default())?;
            println!("{:#?}", decoded);
        }
        "display" => {
            let decoded = brine::value_from_reader(reader, Default::default())?;
            println!("{}", decoded);
        }
        "to_json" => {
            let decoded: json::Value = brine::from_reader(reader, Default::default())?;
            println!("{:#}", decoded);
        }
        other => {
            println!("No such subcommand: {}", other);
            exit(1);
        }
    }
    Ok(())
}
