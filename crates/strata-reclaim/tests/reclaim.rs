use std::sync::{Arc, Mutex};

use strata::{
    backend::null::{NullBackend, NullBuffer, NullQueueControl},
    builder::Builder,
    context::{Device, DeviceBuilder},
    resources::{Buffer, BufferUsage},
    sync::Serial,
    StrataError, UsageError, ValidationError,
};
use strata_reclaim::{MapMode, MapRequestTracker, MapStatus, UploadRecycler};

fn device() -> anyhow::Result<(Device, NullQueueControl)> {
    let (backend, queue) = NullBackend::new();
    Ok((DeviceBuilder::new(backend).build()?, queue))
}

fn buffer(device: &Device, size: u64, usage: BufferUsage) -> anyhow::Result<Arc<Buffer>> {
    let mut builder = device.create_buffer_builder();
    builder.set_size(size)?.set_allowed_usage(usage)?;
    Ok(builder.finish()?)
}

type Statuses = Arc<Mutex<Vec<MapStatus>>>;

fn remember(statuses: Statuses) -> impl FnOnce(strata_reclaim::MapCompletion<'_>) + Send + 'static {
    move |completion| statuses.lock().unwrap().push(completion.status)
}

#[test]
fn map_read_resolves_after_pending_work() -> anyhow::Result<()> {
    let (mut device, queue) = device()?;
    let readback = buffer(&device, 64, BufferUsage::MAP_READ)?;
    let mut tracker = MapRequestTracker::new();
    let statuses = Statuses::default();

    let id = tracker.request(&device, &readback, MapMode::Read, 0, 64, remember(statuses.clone()))?;
    assert!(tracker.is_pending(id));
    assert!(readback.has_pending_map());

    //nothing submitted yet
    device.tick_with(&mut [&mut tracker])?;
    assert!(statuses.lock().unwrap().is_empty());

    device.pending_commands()?;
    let serial = device.submit_pending_commands()?;
    device.tick_with(&mut [&mut tracker])?;
    assert!(statuses.lock().unwrap().is_empty());

    queue.complete_up_to(serial);
    device.tick_with(&mut [&mut tracker])?;
    assert_eq!(*statuses.lock().unwrap(), vec![MapStatus::Success]);
    assert!(readback.is_mapped());
    assert_eq!(tracker.pending(), 0);

    readback.unmap()?;
    Ok(())
}

#[test]
fn map_requests_are_validated() -> anyhow::Result<()> {
    let (device, _queue) = device()?;
    let readback = buffer(&device, 64, BufferUsage::MAP_READ)?;
    let mut tracker = MapRequestTracker::new();
    let statuses = Statuses::default();

    assert_eq!(
        tracker
            .request(&device, &readback, MapMode::Write, 0, 4, remember(statuses.clone()))
            .unwrap_err(),
        StrataError::Validation(ValidationError::MissingUsage {
            required: BufferUsage::MAP_WRITE
        })
    );
    assert!(matches!(
        tracker.request(&device, &readback, MapMode::Read, 60, 8, remember(statuses.clone())),
        Err(StrataError::Validation(ValidationError::RangeOutOfBounds { .. }))
    ));

    tracker.request(&device, &readback, MapMode::Read, 0, 4, remember(statuses.clone()))?;
    assert_eq!(
        tracker
            .request(&device, &readback, MapMode::Read, 4, 4, remember(statuses.clone()))
            .unwrap_err(),
        StrataError::Usage(UsageError::BufferAlreadyMapped)
    );
    assert_eq!(tracker.pending(), 1);
    Ok(())
}

#[test]
fn cancelled_requests_resolve_immediately() -> anyhow::Result<()> {
    let (mut device, queue) = device()?;
    let upload = buffer(&device, 16, BufferUsage::MAP_WRITE)?;
    let mut tracker = MapRequestTracker::new();
    let statuses = Statuses::default();

    let id = tracker.request(&device, &upload, MapMode::Write, 0, 16, remember(statuses.clone()))?;
    assert!(tracker.cancel(id));
    assert!(!tracker.cancel(id));
    assert_eq!(*statuses.lock().unwrap(), vec![MapStatus::Cancelled]);
    assert!(!upload.has_pending_map());

    device.pending_commands()?;
    let serial = device.submit_pending_commands()?;
    queue.complete_up_to(serial);
    device.tick_with(&mut [&mut tracker])?;
    assert_eq!(statuses.lock().unwrap().len(), 1);
    Ok(())
}

#[test]
fn unmapping_cancels_pending_request() -> anyhow::Result<()> {
    let (mut device, queue) = device()?;
    let readback = buffer(&device, 16, BufferUsage::MAP_READ)?;
    let mut tracker = MapRequestTracker::new();
    let statuses = Statuses::default();

    tracker.request(&device, &readback, MapMode::Read, 0, 16, remember(statuses.clone()))?;
    readback.unmap()?;

    device.pending_commands()?;
    let serial = device.submit_pending_commands()?;
    queue.complete_up_to(serial);
    device.tick_with(&mut [&mut tracker])?;
    assert_eq!(*statuses.lock().unwrap(), vec![MapStatus::Cancelled]);
    assert!(!readback.is_mapped());
    Ok(())
}

#[test]
fn cancelling_a_withdrawn_request_keeps_the_newer_one() -> anyhow::Result<()> {
    let (mut device, queue) = device()?;
    let readback = buffer(&device, 16, BufferUsage::MAP_READ)?;
    let mut tracker = MapRequestTracker::new();
    let first = Statuses::default();
    let second = Statuses::default();

    let stale = tracker.request(&device, &readback, MapMode::Read, 0, 16, remember(first.clone()))?;
    readback.unmap()?;
    tracker.request(&device, &readback, MapMode::Read, 0, 16, remember(second.clone()))?;

    assert!(tracker.cancel(stale));
    assert_eq!(*first.lock().unwrap(), vec![MapStatus::Cancelled]);
    assert!(readback.has_pending_map());

    device.pending_commands()?;
    let serial = device.submit_pending_commands()?;
    queue.complete_up_to(serial);
    device.tick_with(&mut [&mut tracker])?;
    assert_eq!(*second.lock().unwrap(), vec![MapStatus::Success]);
    assert!(readback.is_mapped());
    Ok(())
}

#[test]
fn uploads_land_and_chunks_recycle() -> anyhow::Result<()> {
    let (mut device, queue) = device()?;
    let target = buffer(&device, 16, BufferUsage::TRANSFER_DST | BufferUsage::UNIFORM)?;
    let mut uploads = UploadRecycler::new(256, 2);

    let serial = uploads.upload_to_buffer(&mut device, &target, 4, &[7u32, 9])?;
    assert_eq!(serial, device.pending_serial());
    assert_eq!(device.submit_pending_commands()?, serial);
    assert_eq!(uploads.in_flight_chunks(), 1);

    device.tick_with(&mut [&mut uploads])?;
    assert_eq!(uploads.free_chunks(), 0);

    queue.complete_up_to(serial);
    device.tick_with(&mut [&mut uploads])?;
    assert_eq!(uploads.free_chunks(), 1);
    assert_eq!(uploads.in_flight_chunks(), 0);

    let contents = target.native::<NullBuffer>().unwrap().contents();
    assert_eq!(&contents[4..12], bytemuck::cast_slice::<u32, u8>(&[7, 9]));
    assert_eq!(&contents[..4], &[0; 4]);

    //second upload reuses the recycled chunk
    uploads.upload_to_buffer(&mut device, &target, 0, &[1u8; 4])?;
    assert_eq!(uploads.allocations(), 1);
    Ok(())
}

#[test]
fn uploads_are_validated() -> anyhow::Result<()> {
    let (mut device, _queue) = device()?;
    let uniform = buffer(&device, 16, BufferUsage::UNIFORM)?;
    let target = buffer(&device, 16, BufferUsage::TRANSFER_DST)?;
    let mut uploads = UploadRecycler::new(64, 1);

    assert!(matches!(
        uploads.upload_to_buffer(&mut device, &uniform, 0, &[0u8; 4]),
        Err(StrataError::Validation(ValidationError::MissingUsage { .. }))
    ));
    assert!(matches!(
        uploads.upload_to_buffer(&mut device, &target, 8, &[0u32; 3]),
        Err(StrataError::Validation(ValidationError::RangeOutOfBounds { .. }))
    ));
    assert_eq!(uploads.allocations(), 0);
    //rejected uploads do not open a command buffer
    assert!(device.submit_pending_commands().is_err());
    Ok(())
}

#[test]
fn map_and_upload_share_serial_order() -> anyhow::Result<()> {
    let (mut device, queue) = device()?;
    let target = buffer(&device, 16, BufferUsage::TRANSFER_DST)?;
    let readback = buffer(&device, 16, BufferUsage::MAP_READ)?;
    let mut tracker = MapRequestTracker::new();
    let mut uploads = UploadRecycler::new(64, 4);
    let statuses = Statuses::default();

    let first = uploads.upload_to_buffer(&mut device, &target, 0, &[1u8; 16])?;
    tracker.request(&device, &readback, MapMode::Read, 0, 16, remember(statuses.clone()))?;
    device.submit_pending_commands()?;
    let second = uploads.upload_to_buffer(&mut device, &target, 0, &[2u8; 16])?;
    device.submit_pending_commands()?;
    assert_eq!(first, Serial::new(1));
    assert_eq!(second, Serial::new(2));

    queue.complete_up_to(first);
    device.tick_with(&mut [&mut tracker, &mut uploads])?;
    assert_eq!(*statuses.lock().unwrap(), vec![MapStatus::Success]);
    assert_eq!(uploads.free_chunks(), 1);
    assert_eq!(uploads.in_flight_chunks(), 1);

    queue.complete_all();
    device.tick_with(&mut [&mut tracker, &mut uploads])?;
    assert_eq!(uploads.free_chunks(), 2);
    assert_eq!(
        target.native::<NullBuffer>().unwrap().contents(),
        vec![2u8; 16]
    );
    Ok(())
}

#[test]
fn lost_device_rejects_requests() -> anyhow::Result<()> {
    let (mut device, queue) = device()?;
    let readback = buffer(&device, 16, BufferUsage::MAP_READ)?;
    let target = buffer(&device, 16, BufferUsage::TRANSFER_DST)?;

    queue.fail_next_submit("hang");
    device.pending_commands()?;
    assert!(device.submit_pending_commands().is_err());

    let mut tracker = MapRequestTracker::new();
    let statuses = Statuses::default();
    assert!(tracker
        .request(&device, &readback, MapMode::Read, 0, 16, remember(statuses.clone()))
        .unwrap_err()
        .is_device_lost());

    let mut uploads = UploadRecycler::new(64, 1);
    assert!(uploads
        .upload_to_buffer(&mut device, &target, 0, &[0u8; 4])
        .unwrap_err()
        .is_device_lost());
    Ok(())
}
