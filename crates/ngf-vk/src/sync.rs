//! Frame-in-flight synchronization.
//!
//! A [`FrameSyncRing`] keeps one record per frame that may be executing on
//! the device at once. Starting frame `n` reuses record `n % N`: if that
//! record still belongs to an earlier frame, its fence is waited on and the
//! resources it retained are released before the record is handed out
//! again. The ring is generic over [`SyncDevice`] so the retirement rules
//! hold for any fence implementation.

use std::mem;

use ngf_core::{NgfError, Result};

/// Native synchronization primitives used by the ring.
pub trait SyncDevice {
    type Fence: Copy;
    type Semaphore: Copy;
    type CmdBuffer;
    /// A destroyed object whose release is deferred until its frame retires.
    type Object;

    fn create_fence(&self) -> Result<Self::Fence>;
    fn destroy_fence(&self, fence: Self::Fence);

    /// Wait up to `timeout_ns`. `Ok(false)` means the wait timed out.
    fn wait_fence(&self, fence: Self::Fence, timeout_ns: u64) -> Result<bool>;
    fn reset_fence(&self, fence: Self::Fence) -> Result<()>;

    fn create_semaphore(&self) -> Result<Self::Semaphore>;
    fn destroy_semaphore(&self, semaphore: Self::Semaphore);
    fn free_cmd_buffers(&self, cmd_buffers: Vec<Self::CmdBuffer>);
    fn destroy_object(&self, object: Self::Object);
}

pub struct FrameRecord<D: SyncDevice> {
    fence: D::Fence,
    frame: u64,
    active: bool,
    /// Set once work signalling `fence` has been handed to the queue.
    fence_pending: bool,
    wait_semaphores: Vec<D::Semaphore>,
    signal_semaphores: Vec<D::Semaphore>,
    cmd_buffers: Vec<D::CmdBuffer>,
    objects: Vec<D::Object>,
}

impl<D: SyncDevice> FrameRecord<D> {
    fn new(fence: D::Fence) -> Self {
        Self {
            fence,
            frame: 0,
            active: false,
            fence_pending: false,
            wait_semaphores: Vec::new(),
            signal_semaphores: Vec::new(),
            cmd_buffers: Vec::new(),
            objects: Vec::new(),
        }
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn fence(&self) -> D::Fence {
        self.fence
    }

    pub fn wait_semaphores(&self) -> &[D::Semaphore] {
        &self.wait_semaphores
    }

    pub fn signal_semaphores(&self) -> &[D::Semaphore] {
        &self.signal_semaphores
    }

    pub fn cmd_buffers(&self) -> &[D::CmdBuffer] {
        &self.cmd_buffers
    }
}

pub struct FrameSyncRing<D: SyncDevice> {
    records: Vec<FrameRecord<D>>,
    current: Option<usize>,
    timeout_ns: u64,
    fence_waits: u64,
}

impl<D: SyncDevice> FrameSyncRing<D> {
    pub fn new(device: &D, max_inflight_frames: u32, timeout_ns: u64) -> Result<Self> {
        if max_inflight_frames == 0 {
            return Err(NgfError::invalid_op("max_inflight_frames must be at least 1"));
        }
        let mut records = Vec::with_capacity(max_inflight_frames as usize);
        for _ in 0..max_inflight_frames {
            match device.create_fence() {
                Ok(fence) => records.push(FrameRecord::new(fence)),
                Err(e) => {
                    for record in records {
                        device.destroy_fence(record.fence);
                    }
                    return Err(e);
                }
            }
        }
        Ok(Self {
            records,
            current: None,
            timeout_ns,
            fence_waits: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Claim the record for `frame`, retiring the frame that last used it.
    ///
    /// On a fence timeout the old record stays active and the error is
    /// returned; nothing it retained is released.
    pub fn begin_frame(&mut self, device: &D, frame: u64) -> Result<usize> {
        if self.records.is_empty() {
            return Err(NgfError::invalid_op("frame sync ring was destroyed"));
        }
        let slot = (frame % self.records.len() as u64) as usize;
        self.retire(device, slot)?;
        let record = &mut self.records[slot];
        record.active = true;
        record.frame = frame;
        self.current = Some(slot);
        Ok(slot)
    }

    fn retire(&mut self, device: &D, slot: usize) -> Result<()> {
        let record = &mut self.records[slot];
        if !record.active {
            return Ok(());
        }
        if record.fence_pending {
            self.fence_waits += 1;
            if !device.wait_fence(record.fence, self.timeout_ns)? {
                tracing::error!(
                    frame = record.frame,
                    slot,
                    timeout_ns = self.timeout_ns,
                    "timed out waiting for frame fence"
                );
                return Err(NgfError::FenceTimeout {
                    frame: record.frame,
                });
            }
            device.reset_fence(record.fence)?;
            record.fence_pending = false;
        }
        device.free_cmd_buffers(mem::take(&mut record.cmd_buffers));
        for semaphore in record.signal_semaphores.drain(..) {
            device.destroy_semaphore(semaphore);
        }
        record.wait_semaphores.clear();
        for object in record.objects.drain(..) {
            device.destroy_object(object);
        }
        record.active = false;
        tracing::trace!(frame = record.frame, slot, "frame retired");
        Ok(())
    }

    pub fn current(&self) -> Option<&FrameRecord<D>> {
        self.current.map(|slot| &self.records[slot])
    }

    fn current_active_mut(&mut self) -> Option<&mut FrameRecord<D>> {
        let slot = self.current?;
        let record = &mut self.records[slot];
        record.active.then_some(record)
    }

    /// Semaphore the current frame's submission must wait on. Not destroyed
    /// at retirement.
    pub fn add_wait_semaphore(&mut self, semaphore: D::Semaphore) -> Result<()> {
        let record = self
            .current_active_mut()
            .ok_or_else(|| NgfError::invalid_op("no frame in progress"))?;
        record.wait_semaphores.push(semaphore);
        Ok(())
    }

    /// Create `count` semaphores for the current frame's submission to
    /// signal. Each is destroyed when the frame retires.
    pub fn create_signal_semaphores(
        &mut self,
        device: &D,
        count: usize,
    ) -> Result<Vec<D::Semaphore>> {
        let record = self
            .current_active_mut()
            .ok_or_else(|| NgfError::invalid_op("no frame in progress"))?;
        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            let semaphore = device.create_semaphore()?;
            record.signal_semaphores.push(semaphore);
            created.push(semaphore);
        }
        Ok(created)
    }

    pub fn retire_cmd_buffer(&mut self, cmd_buffer: D::CmdBuffer) -> Result<()> {
        let record = self
            .current_active_mut()
            .ok_or_else(|| NgfError::invalid_op("no frame in progress"))?;
        record.cmd_buffers.push(cmd_buffer);
        Ok(())
    }

    /// Defer destruction of `object` until the current frame retires. With
    /// no frame ever started nothing can be in flight, so it goes at once.
    pub fn retire_object(&mut self, device: &D, object: D::Object) {
        match self.current_active_mut() {
            Some(record) => record.objects.push(object),
            None => device.destroy_object(object),
        }
    }

    /// Mark the current frame's fence as handed to the queue and return it.
    pub fn mark_submitted(&mut self) -> Result<D::Fence> {
        let record = self
            .current_active_mut()
            .ok_or_else(|| NgfError::invalid_op("no frame in progress"))?;
        record.fence_pending = true;
        Ok(record.fence)
    }

    /// Retire every active record, oldest frame first.
    pub fn wait_idle(&mut self, device: &D) -> Result<()> {
        let mut slots: Vec<usize> = (0..self.records.len())
            .filter(|&s| self.records[s].active)
            .collect();
        slots.sort_by_key(|&s| self.records[s].frame);
        for slot in slots {
            self.retire(device, slot)?;
        }
        self.current = None;
        Ok(())
    }

    /// Retire everything and destroy the fences. The ring is empty afterwards.
    pub fn destroy(&mut self, device: &D) -> Result<()> {
        self.wait_idle(device)?;
        for record in self.records.drain(..) {
            device.destroy_fence(record.fence);
        }
        Ok(())
    }

    /// Fence waits performed since the ring was created.
    pub fn fence_waits(&self) -> u64 {
        self.fence_waits
    }
}
