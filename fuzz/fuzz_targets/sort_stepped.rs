#![no_main]

use libfuzzer_sys::fuzz_target;

use stepsort::{Step, TimSort};

fuzz_target!(|data: &[u8]| {
    // First byte picks the merge cap, the rest is the payload.
    let Some((&cap, rest)) = data.split_first() else {
        return;
    };

    let mut v = rest.to_vec();
    let mut sort = TimSort::new(&mut v, u8::cmp);
    sort.set_max_merge_size(cap as usize);
    while let Step::Progress { .. } = sort.step() {}
    drop(sort);

    assert!(v.windows(2).all(|w| w[0] <= w[1]));
});
