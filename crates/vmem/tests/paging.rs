use vmem::{VirtualMemory, Word, NUM_FRAMES, NUM_PAGES, TABLES_DEPTH, VIRTUAL_ADDRESS_WIDTH};

#[test]
fn rejects_addresses_outside_the_virtual_space() {
    let mut vm = VirtualMemory::new();
    assert_eq!(vm.read(1 << VIRTUAL_ADDRESS_WIDTH), None);
    assert!(!vm.write(u64::MAX, 7));
    // Nothing was touched: no fault, no restore.
    assert_eq!(vm.stats().faults, 0);
    assert_eq!(vm.stats().restores, 0);
}

#[test]
fn first_read_builds_the_table_chain() {
    let mut vm = VirtualMemory::new();
    // One fault per level: the table chain plus the data page itself.
    assert_eq!(vm.read(0), Some(0));
    assert_eq!(vm.stats().faults, TABLES_DEPTH as u64);
    assert_eq!(vm.stats().restores, 1);
    assert_eq!(vm.stats().evictions, 0);

    // The chain is in place now; another access to the same page is free.
    assert_eq!(vm.read(1), Some(0));
    assert_eq!(vm.stats().faults, TABLES_DEPTH as u64);
}

#[test]
fn written_values_read_back() {
    let mut vm = VirtualMemory::new();
    assert!(vm.write(13, 1313));
    assert!(vm.write(14, -14));
    assert_eq!(vm.read(13), Some(1313));
    assert_eq!(vm.read(14), Some(-14));

    // Overwrite in place.
    assert!(vm.write(13, 0));
    assert_eq!(vm.read(13), Some(0));
}

#[test]
fn eviction_preserves_values_across_the_whole_space() {
    let mut vm = VirtualMemory::new();
    // Far more pages than frames: every probe after the first few dozen
    // has to evict something.
    let step = (1u64 << VIRTUAL_ADDRESS_WIDTH) / 100;
    for i in 0..100u64 {
        assert!(vm.write(i * step, value_for(i)));
    }
    assert!(vm.stats().evictions > 0, "workload never evicted");

    for i in 0..100u64 {
        assert_eq!(vm.read(i * step), Some(value_for(i)), "probe {i}");
    }
}

#[test]
fn dense_page_stays_intact_through_eviction_pressure() {
    let mut vm = VirtualMemory::new();
    // Fill one page completely, then sweep distant pages to force the
    // dense page in and out of memory.
    let base = (NUM_PAGES / 2) << (VIRTUAL_ADDRESS_WIDTH - 16);
    for off in 0..16u64 {
        assert!(vm.write(base + off, (off as Word) + 1000));
    }
    for i in 0..(2 * NUM_FRAMES) {
        assert!(vm.write(i * 4096, i as Word));
    }
    for off in 0..16u64 {
        assert_eq!(vm.read(base + off), Some((off as Word) + 1000));
    }
}

#[test]
fn initialize_resets_the_address_space() {
    let mut vm = VirtualMemory::new();
    assert!(vm.write(99, 7));
    vm.initialize();
    assert_eq!(vm.stats().faults, 0);
    // The root is empty again; the walk rebuilds from scratch.
    assert_eq!(vm.stats().evictions, 0);
}

fn value_for(i: u64) -> Word {
    (i as Word) * 7 + 3
}
