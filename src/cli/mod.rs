pub mod args;

use clap::Parser;

pub use args::{Arguments, ReadIdStyle};

pub fn parse() -> Arguments {
    Arguments::parse()
}
