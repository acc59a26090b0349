use anyhow::Result;

use panbatch::prelude::*;

mod framework;

#[test]
pub fn arena_allocations_are_aligned() -> Result<()> {
    let mut pool = ArenaPool::new(HostAllocator::new(), "test", 4096);
    let a = pool.allocate(3, 1)?;
    let b = pool.allocate(8, 64)?;
    let c = pool.allocate(4, 16)?;
    assert_eq!(b.gpu % 64, 0);
    assert_eq!(c.gpu % 16, 0);
    assert!(b.gpu >= a.gpu + 3);
    assert!(c.gpu >= b.gpu + 8);
    assert_eq!(pool.allocation_count(), 3);
    assert_eq!(pool.slab_count(), 1);
    Ok(())
}

#[test]
pub fn arena_upload_and_read_back() -> Result<()> {
    let mut pool = ArenaPool::new(HostAllocator::new(), "test", 4096);
    let values: [u32; 4] = [7, 11, 13, 17];
    let ptr = pool.upload(&values, 16)?;
    assert_eq!(ptr.size, 16);
    assert_eq!(pool.read_pod::<u32>(ptr.gpu_at(8)), Some(13));
    assert_eq!(pool.read_array::<u32>(ptr.gpu, 4), Some(values.to_vec()));

    pool.write_pod(&ptr, 4, &99u32);
    assert_eq!(pool.read_pod::<u32>(ptr.gpu + 4), Some(99));
    pool.write(&ptr, 12, &[1, 0, 0, 0]);
    assert_eq!(pool.read_pod::<u32>(ptr.gpu + 12), Some(1));

    // Addresses outside of the arena cannot be read.
    assert!(pool.read(0x10, 4).is_none());
    Ok(())
}

#[test]
pub fn arena_memory_is_zeroed() -> Result<()> {
    let mut pool = ArenaPool::new(HostAllocator::new(), "test", 4096);
    let ptr = pool.upload(&[0xffu8; 64], 1)?;
    pool.reset();
    let again = pool.allocate(64, 1)?;
    assert_eq!(again.gpu, ptr.gpu, "Reset moves the offset back to the start");
    assert!(pool.read(again.gpu, 64).unwrap().iter().all(|&byte| byte == 0));
    Ok(())
}

#[test]
pub fn arena_reset_reuses_slabs() -> Result<()> {
    let allocator = HostAllocator::new();
    let mut pool = ArenaPool::new(allocator.clone(), "test", 4096);
    for _ in 0..3 {
        pool.allocate(3000, 8)?;
    }
    assert_eq!(pool.slab_count(), 3);
    assert_eq!(allocator.live_slabs()?, 3);

    pool.reset();
    assert_eq!(pool.allocation_count(), 0);
    for _ in 0..3 {
        pool.allocate(3000, 8)?;
    }
    assert_eq!(pool.slab_count(), 3, "Retained slabs are reused before allocating new ones");
    assert_eq!(allocator.live_bytes()?, 3 * 4096);
    Ok(())
}

#[test]
pub fn arena_large_allocation() -> Result<()> {
    let allocator = HostAllocator::new();
    let mut pool = ArenaPool::new(allocator.clone(), "test", 4096);
    pool.allocate(16, 16)?;
    let large = pool.allocate(10_000, 64)?;
    assert_eq!(pool.slab_count(), 2);
    assert!(pool.read(large.gpu, 10_000).is_some());
    assert!(allocator.live_bytes()? >= 4096 + 10_000);
    Ok(())
}

#[test]
pub fn arena_out_of_memory_is_retryable() -> Result<()> {
    let mut allocator = HostAllocator::new();
    allocator.set_budget(Some(4096));
    let mut pool = ArenaPool::new(allocator.clone(), "budgeted", 4096);
    pool.allocate(4000, 8)?;

    let result = pool.allocate(4000, 8);
    assert!(framework::is_error(result, |err| matches!(
        err,
        Error::OutOfMemory {
            pool: "budgeted",
            requested: 4000
        }
    )));
    assert_eq!(pool.allocation_count(), 1);
    assert_eq!(pool.slab_count(), 1);

    allocator.set_budget(None);
    pool.allocate(4000, 8)?;
    assert_eq!(pool.slab_count(), 2);
    Ok(())
}

#[test]
pub fn host_allocator_shares_state() -> Result<()> {
    let mut allocator = HostAllocator::new();
    let mut clone = allocator.clone();
    let first = allocator.allocate_slab("a", 100)?;
    let second = clone.allocate_slab("b", 5000)?;

    assert_eq!(first.size(), 4096);
    assert_eq!(second.size(), 8192);
    assert_eq!(first.device_address() % 4096, 0);
    assert_eq!(second.device_address(), first.device_address() + 4096);
    assert_eq!(allocator.live_bytes()?, 4096 + 8192);
    assert_eq!(clone.live_slabs()?, 2);

    assert!(first.contains(first.device_address() + 4000, 96));
    assert!(!first.contains(first.device_address() + 4000, 97));

    clone.free_slab(first)?;
    allocator.free_slab(second)?;
    assert_eq!(allocator.live_bytes()?, 0);
    assert_eq!(allocator.live_slabs()?, 0);
    Ok(())
}

#[test]
pub fn dropping_arenas_frees_slabs() -> Result<()> {
    let allocator = HostAllocator::new();
    {
        let mut pool = ArenaPool::new(allocator.clone(), "scoped", 4096);
        pool.allocate(16, 8)?;
        pool.allocate(5000, 8)?;
        assert_eq!(allocator.live_slabs()?, 2);
    }
    assert_eq!(allocator.live_slabs()?, 0);
    assert_eq!(allocator.live_bytes()?, 0);
    Ok(())
}

#[test]
pub fn command_buffers_release_memory() -> Result<()> {
    let context = framework::make_context_with_settings(|settings| settings.desc_slab_size(4096u64))?;
    {
        let mut cmd = framework::recording(&context)?;
        framework::begin_triangle_pass(&mut cmd, vk::AttachmentLoadOp::CLEAR)?;
        cmd.draw(3, 1, 0, 0)?.end_rendering()?;
        cmd.end()?;
        assert!(context.allocator.live_slabs()? > 0);

        // Recording the same thing again after a reset does not grow the arenas.
        let slabs = cmd.desc_pool().slab_count();
        cmd.reset();
        cmd.begin()?;
        framework::begin_triangle_pass(&mut cmd, vk::AttachmentLoadOp::CLEAR)?;
        cmd.draw(3, 1, 0, 0)?.end_rendering()?;
        cmd.end()?;
        assert_eq!(cmd.desc_pool().slab_count(), slabs);
    }
    assert_eq!(context.allocator.live_slabs()?, 0);
    Ok(())
}
