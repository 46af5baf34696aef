#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use optbridge_core::path::{self, Path, Segment};
use optbridge_core::{Map, Value, deep_equal};

#[derive(Arbitrary, Debug)]
enum FuzzSegment {
    Key(u8),
    Index(u8),
}

impl FuzzSegment {
    fn to_segment(&self) -> Segment {
        match self {
            // Small alphabet so writes collide and overwrite each other.
            FuzzSegment::Key(k) => Segment::Key(format!("k{}", k % 4)),
            FuzzSegment::Index(i) => Segment::Index(usize::from(i % 8)),
        }
    }
}

#[derive(Arbitrary, Debug)]
struct Write {
    root: u8,
    rest: Vec<FuzzSegment>,
    value: i32,
}

fuzz_target!(|writes: Vec<Write>| {
    let mut state = Map::new();
    for write in writes.iter().take(64) {
        let mut segments = vec![Segment::Key(format!("r{}", write.root % 4))];
        segments.extend(write.rest.iter().take(6).map(FuzzSegment::to_segment));
        let Some(target) = Path::from_segments(segments) else {
            continue;
        };
        let value = Value::from(write.value);
        path::assign(&mut state, &target, value.clone()).expect("small indices never exceed the padding limit");
        assert!(deep_equal(path::resolve_in(&state, &target), Some(&value)));
        assert_eq!(path::snapshot_at(&state, &target), Some(value));
    }
});
