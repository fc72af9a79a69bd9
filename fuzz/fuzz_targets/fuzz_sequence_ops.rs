#![no_main]

use std::cell::RefCell;
use std::rc::Rc;

use arbitrary::Arbitrary;
use ftui_observe::subscriber::from_collection_fn;
use ftui_observe::{
    Collection, ObserverConfig, ObserverLocator, Sequence, Subscribable, Value, batch, instrument,
};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum FuzzOp {
    Push(u8),
    Pop,
    Shift,
    Unshift(Vec<u8>),
    Splice { start: i8, count: Option<u8>, items: Vec<u8> },
    Insert(u8, u8),
    Remove(u8),
    Set(u8, u8),
    SetLen(u8),
    Reverse,
    Sort,
    Clear,
}

#[derive(Arbitrary, Debug)]
struct Input {
    initial: Vec<u8>,
    batched: bool,
    ops: Vec<FuzzOp>,
}

fn value(n: u8) -> Value {
    Value::from(i32::from(n))
}

impl FuzzOp {
    fn run(&self, sequence: &Sequence) {
        match self {
            FuzzOp::Push(n) => {
                sequence.push(value(*n));
            }
            FuzzOp::Pop => {
                sequence.pop();
            }
            FuzzOp::Shift => {
                sequence.shift();
            }
            FuzzOp::Unshift(items) => {
                sequence.unshift(items.iter().take(16).map(|n| value(*n)));
            }
            FuzzOp::Splice { start, count, items } => {
                sequence.splice(
                    isize::from(*start),
                    count.map(usize::from),
                    items.iter().take(16).map(|n| value(*n)),
                );
            }
            FuzzOp::Insert(at, n) => sequence.insert(usize::from(*at), value(*n)),
            FuzzOp::Remove(at) => {
                sequence.remove(usize::from(*at));
            }
            FuzzOp::Set(at, n) => sequence.set(usize::from(*at), value(*n)),
            FuzzOp::SetLen(len) => sequence.set_len(usize::from(*len)),
            FuzzOp::Reverse => sequence.reverse(),
            FuzzOp::Sort => sequence.sort_by(|a, b| {
                a.as_number()
                    .partial_cmp(&b.as_number())
                    .unwrap_or(std::cmp::Ordering::Equal)
            }),
            FuzzOp::Clear => sequence.clear(),
        }
    }
}

fuzz_target!(|input: Input| {
    instrument::reset();
    let locator = ObserverLocator::new(ObserverConfig::default());
    let sequence = Sequence::from_values(input.initial.iter().take(64).map(|n| value(*n)));

    // Shadow copy kept in sync purely from delivered diffs.
    let shadow = Rc::new(RefCell::new(sequence.to_vec()));
    let sink = Rc::clone(&shadow);
    let source = sequence.clone();
    locator
        .get_collection_observer(&Collection::from(&sequence))
        .subscribe(from_collection_fn(move |map, _| {
            let current = source.to_vec();
            assert_eq!(map.len(), current.len());
            let next = map.apply(&sink.borrow(), |position| current[position].clone());
            *sink.borrow_mut() = next;
        }));

    let ops = input.ops.iter().take(64);
    if input.batched {
        batch::batch(|| ops.for_each(|op| op.run(&sequence)));
    } else {
        ops.for_each(|op| op.run(&sequence));
    }

    assert_eq!(*shadow.borrow(), sequence.to_vec());
    instrument::reset();
});
