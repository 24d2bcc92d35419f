//! AFL fuzz target for the transaction-list codec.
//!
//! Feeds arbitrary bytes straight into `TxList::unmarshal`, the most
//! deeply nested value type on the wire (it recurses through `Tx`,
//! `Addr`, and three `numeric_enum!` types). A malformed input must
//! produce a `CodecError`, never a panic.
unsafe extern "C" {
    fn __AFL_LOOP(cnt: u32) -> i32;
}
use std::io::{self, Read};

use mcd_client::codec::primitive::Cursor;
use mcd_client::codec::request::MAX_FRAME_LEN;
use mcd_client::codec::value::TxList;

fn main() {
    let mut data = Vec::with_capacity(MAX_FRAME_LEN);
    loop {
        if unsafe { __AFL_LOOP(1000) } == 0 {
            break;
        }
        data.clear();
        if io::stdin()
            .take(MAX_FRAME_LEN as u64)
            .read_to_end(&mut data)
            .is_err()
        {
            return;
        }

        let mut cursor = Cursor::new(&data);
        let _ = TxList::unmarshal(&mut cursor);
    }
}
