//! Integration tests for block relocation (swap) and duplication (COW).

use kv_cache_ops::device::Device;
use kv_cache_ops::ops::{duplicate_blocks, relocate_blocks};
use kv_cache_ops::tensor::CacheTensor;

fn filled(num_blocks: usize, seed: f32) -> CacheTensor<f32> {
    let shape = [num_blocks, 4, 2];
    let data: Vec<f32> = (0..num_blocks * 8).map(|i| seed + i as f32).collect();
    CacheTensor::from_vec(data, &shape, Device::host()).unwrap()
}

#[test]
fn test_relocate_roundtrip_restores_block() {
    // Swap block 1 out of the resident cache into secondary index 3, then
    // swap it back. The resident block must be restored exactly.
    let mut resident = filled(4, 0.0);
    let mut secondary = CacheTensor::zeros(&[6, 4, 2], Device::host());
    let original = resident.block(1).unwrap().to_vec();

    relocate_blocks(&mut secondary, &resident, &[(1, 3)]).unwrap();
    assert_eq!(secondary.block(3).unwrap(), original.as_slice());

    // Clobber the resident copy, then swap back in.
    let junk = filled(4, 900.0);
    relocate_blocks(&mut resident, &junk, &[(0, 1)]).unwrap();
    assert_ne!(resident.block(1).unwrap(), original.as_slice());

    relocate_blocks(&mut resident, &secondary, &[(3, 1)]).unwrap();
    assert_eq!(resident.block(1).unwrap(), original.as_slice());
}

#[test]
fn test_relocate_batched_pairs() {
    let src = filled(4, 100.0);
    let mut dst = CacheTensor::zeros(&[4, 4, 2], Device::host());

    relocate_blocks(&mut dst, &src, &[(0, 2), (3, 0), (1, 1)]).unwrap();

    assert_eq!(dst.block(2).unwrap(), src.block(0).unwrap());
    assert_eq!(dst.block(0).unwrap(), src.block(3).unwrap());
    assert_eq!(dst.block(1).unwrap(), src.block(1).unwrap());
    // One gather on the source device, one copy on the destination.
    assert_eq!(src.device().stats().gather_ops, 1);
    assert_eq!(dst.device().stats().copy_ops, 1);
}

#[test]
fn test_relocate_empty_mapping_is_byte_noop() {
    let src = filled(2, 0.0);
    let mut dst = filled(2, 40.0);
    let before = dst.as_bytes().to_vec();

    relocate_blocks(&mut dst, &src, &[]).unwrap();

    assert_eq!(dst.as_bytes(), before.as_slice());
    let stats = dst.device().stats();
    assert_eq!(stats.mark_steps, 0);
    assert_eq!(stats.synchronizes, 0);
    assert_eq!(stats.copy_ops, 0);
}

#[test]
fn test_relocate_synchronizes_once_per_call() {
    let src = filled(2, 0.0);
    let mut dst = CacheTensor::zeros(&[2, 4, 2], Device::host());

    relocate_blocks(&mut dst, &src, &[(0, 0)]).unwrap();
    relocate_blocks(&mut dst, &src, &[(1, 1)]).unwrap();

    let stats = dst.device().stats();
    assert_eq!(stats.mark_steps, 2);
    assert_eq!(stats.synchronizes, 2);
}

#[test]
fn test_duplicate_fanout_same_cache() {
    // Fan source block 1 out to destinations 2 and 3: afterwards all
    // three hold identical rows, in every parallel tensor.
    let device = Device::host();
    let shape = [4, 4, 2];
    let mut keys = Vec::new();
    let mut values = Vec::new();
    for layer in 0..3 {
        let base = (layer * 1000) as f32;
        let data: Vec<f32> = (0..32).map(|i| base + i as f32).collect();
        keys.push(CacheTensor::from_vec(data.clone(), &shape, device.clone()).unwrap());
        let data: Vec<f32> = (0..32).map(|i| base + 500.0 + i as f32).collect();
        values.push(CacheTensor::from_vec(data, &shape, device.clone()).unwrap());
    }

    duplicate_blocks(&mut keys, &mut values, &[(1, 2), (1, 3)]).unwrap();

    for cache in keys.iter().chain(values.iter()) {
        let src = cache.block(1).unwrap();
        assert_eq!(cache.block(2).unwrap(), src);
        assert_eq!(cache.block(3).unwrap(), src);
        // Block 0 is untouched.
        assert_ne!(cache.block(0).unwrap(), src);
    }
}

#[test]
fn test_duplicate_empty_mapping_is_byte_noop() {
    let device = Device::host();
    let shape = [2, 4, 2];
    let data: Vec<f32> = (0..16).map(|i| i as f32).collect();
    let mut keys = vec![CacheTensor::from_vec(data.clone(), &shape, device.clone()).unwrap()];
    let mut values = vec![CacheTensor::from_vec(data, &shape, device.clone()).unwrap()];
    let before_k = keys[0].as_bytes().to_vec();
    let before_v = values[0].as_bytes().to_vec();

    duplicate_blocks(&mut keys, &mut values, &[]).unwrap();

    assert_eq!(keys[0].as_bytes(), before_k.as_slice());
    assert_eq!(values[0].as_bytes(), before_v.as_slice());
    assert_eq!(device.stats().mark_steps, 0);
    assert_eq!(device.stats().copy_ops, 0);
}

#[test]
fn test_duplicate_marks_step_on_accelerator_only() {
    let shape = [2, 4, 2];

    let host = Device::host();
    let mut keys = vec![CacheTensor::<f32>::zeros(&shape, host.clone())];
    let mut values = vec![CacheTensor::<f32>::zeros(&shape, host.clone())];
    duplicate_blocks(&mut keys, &mut values, &[(0, 1)]).unwrap();
    assert_eq!(host.stats().mark_steps, 0);

    let gpu = Device::cuda(0);
    let mut keys = vec![CacheTensor::<f32>::zeros(&shape, gpu.clone())];
    let mut values = vec![CacheTensor::<f32>::zeros(&shape, gpu.clone())];
    duplicate_blocks(&mut keys, &mut values, &[(0, 1)]).unwrap();
    assert_eq!(gpu.stats().mark_steps, 1);
    assert_eq!(gpu.stats().synchronizes, 0);
}
