//! Integration test: frame-in-flight ring
//!
//! Run with: cargo test -p ngf-vk --test frame_sync_test

use std::cell::{Cell, RefCell};

use ngf_core::{NgfError, Result};
use ngf_vk::{FrameSyncRing, SyncDevice};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Wait(u32),
    Reset(u32),
    DestroySemaphore(u32),
    FreeCmdBuffers(Vec<u32>),
    DestroyObject(u32),
    DestroyFence(u32),
}

#[derive(Default)]
struct FakeDevice {
    next_fence: Cell<u32>,
    next_semaphore: Cell<u32>,
    /// Fences whose waits time out.
    stuck: RefCell<Vec<u32>>,
    log: RefCell<Vec<Event>>,
}

impl FakeDevice {
    fn take_log(&self) -> Vec<Event> {
        std::mem::take(&mut *self.log.borrow_mut())
    }

    fn waits(&self) -> Vec<u32> {
        self.log
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Wait(f) => Some(*f),
                _ => None,
            })
            .collect()
    }
}

impl SyncDevice for FakeDevice {
    type Fence = u32;
    type Semaphore = u32;
    type CmdBuffer = u32;
    type Object = u32;

    fn create_fence(&self) -> Result<u32> {
        let id = self.next_fence.get();
        self.next_fence.set(id + 1);
        Ok(id)
    }

    fn destroy_fence(&self, fence: u32) {
        self.log.borrow_mut().push(Event::DestroyFence(fence));
    }

    fn wait_fence(&self, fence: u32, _timeout_ns: u64) -> Result<bool> {
        self.log.borrow_mut().push(Event::Wait(fence));
        Ok(!self.stuck.borrow().contains(&fence))
    }

    fn reset_fence(&self, fence: u32) -> Result<()> {
        self.log.borrow_mut().push(Event::Reset(fence));
        Ok(())
    }

    fn create_semaphore(&self) -> Result<u32> {
        let id = self.next_semaphore.get();
        self.next_semaphore.set(id + 1);
        Ok(200 + id)
    }

    fn destroy_semaphore(&self, semaphore: u32) {
        self.log.borrow_mut().push(Event::DestroySemaphore(semaphore));
    }

    fn free_cmd_buffers(&self, cmd_buffers: Vec<u32>) {
        if !cmd_buffers.is_empty() {
            self.log.borrow_mut().push(Event::FreeCmdBuffers(cmd_buffers));
        }
    }

    fn destroy_object(&self, object: u32) {
        self.log.borrow_mut().push(Event::DestroyObject(object));
    }
}

fn run_frame(ring: &mut FrameSyncRing<FakeDevice>, dev: &FakeDevice, frame: u64) -> Result<()> {
    ring.begin_frame(dev, frame)?;
    ring.mark_submitted()?;
    Ok(())
}

#[test]
fn test_first_lap_never_waits() {
    ngf_common::try_init_logging();
    let dev = FakeDevice::default();
    let mut ring = FrameSyncRing::new(&dev, 3, 1_000).unwrap();
    for frame in 0..3 {
        run_frame(&mut ring, &dev, frame).unwrap();
    }
    assert!(dev.waits().is_empty());
    assert_eq!(ring.fence_waits(), 0);

    // Frame 3 reuses frame 0's record and fence.
    run_frame(&mut ring, &dev, 3).unwrap();
    assert_eq!(dev.waits(), vec![0]);
    assert_eq!(ring.fence_waits(), 1);
    assert_eq!(ring.current().map(|r| r.frame()), Some(3));
}

#[test]
fn test_unsubmitted_frame_retires_without_waiting() {
    ngf_common::try_init_logging();
    let dev = FakeDevice::default();
    let mut ring = FrameSyncRing::new(&dev, 1, 1_000).unwrap();
    ring.begin_frame(&dev, 0).unwrap();
    ring.retire_cmd_buffer(7).unwrap();
    ring.begin_frame(&dev, 1).unwrap();
    assert_eq!(dev.take_log(), vec![Event::FreeCmdBuffers(vec![7])]);
}

#[test]
fn test_retirement_releases_frame_resources() {
    ngf_common::try_init_logging();
    let dev = FakeDevice::default();
    let mut ring = FrameSyncRing::new(&dev, 2, 1_000).unwrap();

    ring.begin_frame(&dev, 0).unwrap();
    ring.add_wait_semaphore(100).unwrap();
    assert_eq!(ring.create_signal_semaphores(&dev, 1).unwrap(), vec![200]);
    ring.retire_cmd_buffer(10).unwrap();
    ring.retire_cmd_buffer(11).unwrap();
    ring.retire_object(&dev, 50);
    {
        let record = ring.current().unwrap();
        assert_eq!(record.wait_semaphores(), &[100]);
        assert_eq!(record.signal_semaphores(), &[200]);
        assert_eq!(record.cmd_buffers(), &[10, 11]);
    }
    assert_eq!(ring.mark_submitted().unwrap(), 0);
    run_frame(&mut ring, &dev, 1).unwrap();
    assert!(dev.take_log().is_empty());

    run_frame(&mut ring, &dev, 2).unwrap();
    // Acquire semaphores are borrowed, so only the signal one is destroyed.
    assert_eq!(
        dev.take_log(),
        vec![
            Event::Wait(0),
            Event::Reset(0),
            Event::FreeCmdBuffers(vec![10, 11]),
            Event::DestroySemaphore(200),
            Event::DestroyObject(50),
        ]
    );
    let record = ring.current().unwrap();
    assert!(record.wait_semaphores().is_empty());
    assert!(record.cmd_buffers().is_empty());
}

#[test]
fn test_one_signal_semaphore_per_submitted_buffer() {
    ngf_common::try_init_logging();
    let dev = FakeDevice::default();
    let mut ring = FrameSyncRing::new(&dev, 2, 1_000).unwrap();

    ring.begin_frame(&dev, 0).unwrap();
    for cb in 10..13 {
        ring.retire_cmd_buffer(cb).unwrap();
    }
    let signals = ring.create_signal_semaphores(&dev, 3).unwrap();
    assert_eq!(signals, vec![200, 201, 202]);
    assert_eq!(ring.current().unwrap().signal_semaphores(), &[200, 201, 202]);
    ring.mark_submitted().unwrap();
    run_frame(&mut ring, &dev, 1).unwrap();
    run_frame(&mut ring, &dev, 2).unwrap();

    let destroyed: Vec<u32> = dev
        .take_log()
        .into_iter()
        .filter_map(|e| match e {
            Event::DestroySemaphore(s) => Some(s),
            _ => None,
        })
        .collect();
    assert_eq!(destroyed, vec![200, 201, 202]);
}

#[test]
fn test_fence_timeout_keeps_record_active() {
    ngf_common::try_init_logging();
    let dev = FakeDevice::default();
    let mut ring = FrameSyncRing::new(&dev, 1, 1_000).unwrap();
    ring.begin_frame(&dev, 0).unwrap();
    ring.retire_object(&dev, 9);
    ring.mark_submitted().unwrap();

    dev.stuck.borrow_mut().push(0);
    match ring.begin_frame(&dev, 1) {
        Err(NgfError::FenceTimeout { frame }) => assert_eq!(frame, 0),
        other => panic!("expected a fence timeout, got {other:?}"),
    }
    assert_eq!(dev.take_log(), vec![Event::Wait(0)]);
    assert_eq!(ring.current().map(|r| r.frame()), Some(0));
    assert!(ring.current().unwrap().is_active());

    // Once the fence signals the same frame retires normally.
    dev.stuck.borrow_mut().clear();
    ring.begin_frame(&dev, 1).unwrap();
    assert_eq!(
        dev.take_log(),
        vec![Event::Wait(0), Event::Reset(0), Event::DestroyObject(9)]
    );
}

#[test]
fn test_objects_destroyed_at_once_without_a_frame() {
    ngf_common::try_init_logging();
    let dev = FakeDevice::default();
    let mut ring = FrameSyncRing::new(&dev, 2, 1_000).unwrap();
    ring.retire_object(&dev, 3);
    assert_eq!(dev.take_log(), vec![Event::DestroyObject(3)]);
    assert!(matches!(
        ring.retire_cmd_buffer(1),
        Err(NgfError::InvalidOperation(_))
    ));
    assert!(ring.create_signal_semaphores(&dev, 1).is_err());
}

#[test]
fn test_zero_frames_in_flight_is_rejected() {
    ngf_common::try_init_logging();
    let dev = FakeDevice::default();
    assert!(FrameSyncRing::new(&dev, 0, 1_000).is_err());
}

#[test]
fn test_destroy_drains_oldest_first() {
    ngf_common::try_init_logging();
    let dev = FakeDevice::default();
    let mut ring = FrameSyncRing::new(&dev, 3, 1_000).unwrap();
    for frame in 0..5 {
        run_frame(&mut ring, &dev, frame).unwrap();
    }
    dev.take_log();

    ring.destroy(&dev).unwrap();
    // Slots 0..2 hold frames 3, 4 and 2.
    assert_eq!(
        dev.take_log(),
        vec![
            Event::Wait(2),
            Event::Reset(2),
            Event::Wait(0),
            Event::Reset(0),
            Event::Wait(1),
            Event::Reset(1),
            Event::DestroyFence(0),
            Event::DestroyFence(1),
            Event::DestroyFence(2),
        ]
    );
    assert!(ring.is_empty());
    assert!(ring.begin_frame(&dev, 5).is_err());
}
