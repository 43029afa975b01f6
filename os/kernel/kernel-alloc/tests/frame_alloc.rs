use kernel_alloc::{ArenaMemory, FrameAllocator, FrameError, MemoryLayout, PhysicalAddress};
use kernel_info::param::{ALLOC_JUNK, FREE_JUNK, PAGE_SIZE};
use kernel_sync::hosted::HostCpu;
use std::collections::HashSet;
use std::thread;

const BASE: u64 = 0x8000_0000;

fn layout(frames: u64, cpus: usize) -> MemoryLayout {
    MemoryLayout::new(
        PhysicalAddress::new(BASE),
        PhysicalAddress::new(BASE + frames * PAGE_SIZE),
        cpus,
    )
    .unwrap()
}

#[test]
fn hands_out_every_frame_exactly_once() {
    let layout = layout(16, 2);
    let memory = ArenaMemory::new(layout);
    let frames = FrameAllocator::new(layout, &memory, HostCpu::new(2));
    assert_eq!(frames.total_frames(), 16);
    assert_eq!(frames.free_frames(), 16);

    let mut live = HashSet::new();
    for _ in 0..16 {
        let f = frames.allocate().unwrap();
        assert!(f.base().is_page_aligned());
        assert!(frames.layout().contains(f.base()));
        assert!(live.insert(f), "frame {f} handed out twice");
        assert_eq!(frames.reference_count(f.base()), Ok(1));
    }

    assert_eq!(frames.free_frames(), 0);
    assert_eq!(frames.allocate(), Err(FrameError::OutOfMemory));

    for f in &live {
        frames.free(f.base());
    }
    assert_eq!(frames.free_frames(), 16);

    // everything is allocatable again
    for _ in 0..16 {
        frames.allocate().unwrap();
    }
}

#[test]
fn frames_carry_junk_patterns() {
    let layout = layout(4, 1);
    let memory = ArenaMemory::new(layout);
    let frames = FrameAllocator::new(layout, &memory, HostCpu::new(1));

    // SAFETY (all reads below): single-threaded, nobody else touches the frame.
    let first = layout.first_frame();
    assert!(unsafe { memory.bytes(first) }.iter().all(|&b| b == FREE_JUNK));

    let f = frames.allocate().unwrap();
    assert!(unsafe { memory.bytes(f) }.iter().all(|&b| b == ALLOC_JUNK));

    unsafe { memory.bytes_mut(f) }.fill(0xAA);
    frames.free(f.base());
    assert!(unsafe { memory.bytes(f) }.iter().all(|&b| b == FREE_JUNK));
}

#[test]
fn shared_frame_survives_until_last_reference() {
    let layout = layout(4, 1);
    let memory = ArenaMemory::new(layout);
    let frames = FrameAllocator::new(layout, &memory, HostCpu::new(1));

    let f = frames.allocate().unwrap();
    unsafe { memory.bytes_mut(f) }.fill(0x42);

    // any address inside the frame names it
    frames.add_reference(f.base() + 100);
    frames.add_reference(f.base());
    assert_eq!(frames.reference_count(f.base()), Ok(3));

    frames.free(f.base());
    frames.free(f.base());
    assert_eq!(frames.reference_count(f.base()), Ok(1));
    assert_eq!(frames.free_frames(), 3);
    assert!(unsafe { memory.bytes(f) }.iter().all(|&b| b == 0x42));

    frames.free(f.base());
    assert_eq!(frames.reference_count(f.base()), Ok(0));
    assert_eq!(frames.free_frames(), 4);
    assert!(unsafe { memory.bytes(f) }.iter().all(|&b| b == FREE_JUNK));
}

#[test]
fn empty_core_steals_from_others() {
    let layout = layout(8, 2);
    let memory = ArenaMemory::new(layout);
    let cpu = HostCpu::new(2);
    let frames = FrameAllocator::new(layout, &memory, cpu);

    cpu.bind(0);
    let all: HashSet<_> = (0..8).map(|_| frames.allocate().unwrap()).collect();
    assert_eq!(all.len(), 8);
    assert_eq!(frames.allocate(), Err(FrameError::OutOfMemory));
}

#[test]
fn freed_frame_joins_the_freeing_core() {
    let layout = layout(8, 2);
    let memory = ArenaMemory::new(layout);
    let cpu = HostCpu::new(2);
    let frames = FrameAllocator::new(layout, &memory, cpu);

    cpu.bind(0);
    let f = frames.allocate().unwrap();
    assert_eq!(f, layout.first_frame());

    cpu.bind(1);
    frames.free(f.base());

    // LIFO: the next allocation on core 1 returns the frame it just received
    assert_eq!(frames.allocate(), Ok(f));
    assert_eq!(frames.reference_count(f.base()), Ok(1));
}

#[test]
fn addresses_outside_the_range() {
    let layout = layout(4, 1);
    let memory = ArenaMemory::new(layout);
    let frames = FrameAllocator::new(layout, &memory, HostCpu::new(1));

    let below = PhysicalAddress::new(BASE - PAGE_SIZE);
    let top = layout.phys_top();
    assert_eq!(
        frames.reference_count(below),
        Err(FrameError::OutOfRange(below))
    );
    assert_eq!(frames.reference_count(top), Err(FrameError::OutOfRange(top)));

    // ignored, not fatal
    frames.add_reference(below);
    frames.add_reference(top);
    assert_eq!(frames.free_frames(), 4);
}

#[test]
#[should_panic(expected = "double free")]
fn double_free_is_fatal() {
    let layout = layout(4, 1);
    let memory = ArenaMemory::new(layout);
    let frames = FrameAllocator::new(layout, &memory, HostCpu::new(1));
    let f = frames.allocate().unwrap();
    frames.free(f.base());
    frames.free(f.base());
}

#[test]
#[should_panic(expected = "kfree")]
fn misaligned_free_is_fatal() {
    let layout = layout(4, 1);
    let memory = ArenaMemory::new(layout);
    let frames = FrameAllocator::new(layout, &memory, HostCpu::new(1));
    let f = frames.allocate().unwrap();
    frames.free(f.base() + 8);
}

#[test]
#[should_panic(expected = "kfree")]
fn free_outside_range_is_fatal() {
    let layout = layout(4, 1);
    let memory = ArenaMemory::new(layout);
    let frames = FrameAllocator::new(layout, &memory, HostCpu::new(1));
    frames.free(layout.phys_top());
}

#[test]
#[should_panic(expected = "not allocated")]
fn add_reference_to_free_frame_is_fatal() {
    let layout = layout(4, 1);
    let memory = ArenaMemory::new(layout);
    let frames = FrameAllocator::new(layout, &memory, HostCpu::new(1));
    frames.add_reference(layout.first_frame().base());
}

#[test]
fn concurrent_churn_keeps_counts_consistent() {
    const THREADS: usize = 4;
    const ROUNDS: usize = 2_000;

    let layout = layout(64, THREADS);
    let memory = ArenaMemory::new(layout);
    let cpu = HostCpu::new(THREADS);
    let frames = FrameAllocator::new(layout, &memory, cpu);

    thread::scope(|s| {
        for t in 0..THREADS {
            let frames = &frames;
            s.spawn(move || {
                cpu.bind(t);
                let mut held = Vec::new();
                for i in 0..ROUNDS {
                    if let Ok(f) = frames.allocate() {
                        if i % 3 == 0 {
                            frames.add_reference(f.base());
                            frames.free(f.base());
                        }
                        held.push(f);
                    }
                    if held.len() > 10 || i % 5 == 0 {
                        if let Some(f) = held.pop() {
                            frames.free(f.base());
                        }
                    }
                }
                for f in held {
                    frames.free(f.base());
                }
                assert_eq!(HostCpu::preempt_depth(), 0);
            });
        }
    });

    assert_eq!(frames.free_frames(), frames.total_frames());
    for i in 0..layout.frame_count() {
        assert_eq!(frames.reference_count(layout.frame_at(i).base()), Ok(0));
    }
}
