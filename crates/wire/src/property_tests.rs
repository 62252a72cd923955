// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Property tests: any frame survives the framing layer byte-for-byte,
//! and request envelopes survive encode/decode.

use proptest::prelude::*;

use crate::{decode, encode, read_message, write_message, Method, Request};

proptest! {
    #[test]
    fn framing_round_trips_arbitrary_payloads(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let mut buffer = Vec::new();
            write_message(&mut buffer, &payload).await.unwrap();
            let mut cursor = std::io::Cursor::new(buffer);
            let back = read_message(&mut cursor).await.unwrap();
            prop_assert_eq!(back, payload);
            Ok(())
        })?;
    }

    #[test]
    fn request_envelope_round_trips(id in any::<u64>(), name in "[a-z][a-z0-9-]{0,16}") {
        let request = Request { id, method: Method::ProcessRestart { name: name.clone() } };
        let bytes = encode(&request).unwrap();
        let back: Request = decode(&bytes).unwrap();
        prop_assert_eq!(back, request);
    }

    #[test]
    fn tail_params_round_trip(n in 0usize..100_000) {
        let request = Request {
            id: 1,
            method: Method::LogsTail { name: "p".to_string(), stream: None, n },
        };
        let bytes = encode(&request).unwrap();
        let back: Request = decode(&bytes).unwrap();
        prop_assert_eq!(back, request);
    }
}
