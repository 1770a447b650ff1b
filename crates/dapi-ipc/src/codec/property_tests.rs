//! Property tests for the codec over every built-in function.
//!
//! Each function is exercised with both its command and its reply layout,
//! filled with arbitrary scalars, byte strings and lists.

use std::io::Cursor;

use proptest::prelude::*;

use super::*;
use crate::protocol::{Code, Protocol, Role};

/// A frame to write with one layout and read back with its counterpart
#[derive(Debug, Clone)]
struct Frame {
    header: Header,
    write: RecordLayout,
    read: RecordLayout,
    args: Args,
}

fn all_layouts() -> Vec<(Code, RecordLayout, RecordLayout)> {
    let protocol = Protocol::builtin().unwrap();
    let mut layouts = Vec::new();
    for op in protocol.operations() {
        for (write, read) in [
            (Role::WriteCommand, Role::ReadCommand),
            (Role::WriteReply, Role::ReadReply),
        ] {
            layouts.push((
                op.code(write),
                op.layout(write).clone(),
                op.layout(read).clone(),
            ));
        }
    }
    layouts
}

fn arb_bytes() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..48)
}

fn arb_value(ty: &ArgType) -> BoxedStrategy<Value> {
    match ty {
        ArgType::Bool => any::<bool>().prop_map(Value::Bool).boxed(),
        ArgType::Int(_) => any::<i32>().prop_map(Value::Int).boxed(),
        ArgType::String => arb_bytes().prop_map(Value::String).boxed(),
        ArgType::StringList => prop::collection::vec(arb_bytes(), 0..6)
            .prop_map(Value::StringList)
            .boxed(),
        ArgType::IntList => prop::collection::vec(any::<i32>(), 0..12)
            .prop_map(Value::IntList)
            .boxed(),
    }
}

fn arb_args(layout: &RecordLayout) -> BoxedStrategy<Args> {
    let names: Vec<String> = layout.fields.iter().map(|f| f.name.clone()).collect();
    let values: Vec<_> = layout.fields.iter().map(|f| arb_value(&f.ty)).collect();
    values
        .prop_map(move |values| {
            names
                .iter()
                .zip(values)
                .fold(Args::new(), |args, (name, value)| args.with(name, value))
        })
        .boxed()
}

fn arb_frame() -> impl Strategy<Value = Frame> {
    proptest::sample::select(all_layouts()).prop_flat_map(|(code, write, read)| {
        (any::<i32>(), arb_args(&write)).prop_map(move |(sequence, args)| Frame {
            header: Header::new(code, sequence),
            write: write.clone(),
            read: read.clone(),
            args,
        })
    })
}

fn read_frame(cursor: &mut Cursor<&[u8]>, layout: &RecordLayout) -> (Header, Args) {
    let header = Header::read_from(cursor).unwrap();
    let args = decode_body(cursor, layout, wire::DEFAULT_MAX_PAYLOAD_LEN).unwrap();
    (header, args)
}

proptest! {
    #[test]
    fn test_frame_roundtrip(frame in arb_frame()) {
        let bytes = encode_frame(frame.header, &frame.write, &frame.args).unwrap();
        let mut cursor = Cursor::new(bytes.as_slice());
        let (header, args) = read_frame(&mut cursor, &frame.read);

        prop_assert_eq!(header, frame.header);
        prop_assert_eq!(args, frame.args);
        prop_assert_eq!(cursor.position() as usize, bytes.len());
    }

    #[test]
    fn test_concatenated_frames_decode_alone(first in arb_frame(), second in arb_frame()) {
        let a = encode_frame(first.header, &first.write, &first.args).unwrap();
        let b = encode_frame(second.header, &second.write, &second.args).unwrap();
        let alone_a = read_frame(&mut Cursor::new(a.as_slice()), &first.read);
        let alone_b = read_frame(&mut Cursor::new(b.as_slice()), &second.read);

        let stream = [a.as_slice(), b.as_slice()].concat();
        let mut cursor = Cursor::new(stream.as_slice());
        prop_assert_eq!(read_frame(&mut cursor, &first.read), alone_a);
        prop_assert_eq!(read_frame(&mut cursor, &second.read), alone_b);
        prop_assert_eq!(cursor.position() as usize, stream.len());
    }
}
