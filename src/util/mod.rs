pub mod log;

use humansize::{BINARY, format_size};

pub fn format_bytes(bytes: u64) -> String {
    let print_config = BINARY.decimal_places(3).decimal_zeroes(3);
    format_size(bytes, print_config)
}
