// src/timing.rs
// Per-frame timing markers: a flat ordered log of (category, label) events
// with device timestamps when TIMESTAMP_QUERY is available.
// Resolved timestamps are read back at the presentation boundary, the only
// point where the host waits on the device.

use std::sync::Arc;

use futures_intrusive::channel::shared::oneshot_channel;

const MAX_EVENTS: u32 = 256;

/// Identifier of a registered timing event. Cheap to copy; the recorder
/// resolves it back to its category and label for UI display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventId(u32);

struct EventDesc {
    category: String,
    label: String,
}

/// One finished timing sample: event plus milliseconds until the next marker.
#[derive(Debug, Clone)]
pub struct EventTiming {
    pub id: EventId,
    pub milliseconds: f32,
}

pub struct EventRecorder {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    descs: Vec<EventDesc>,
    frame: Vec<EventId>,
    query_set: Option<wgpu::QuerySet>,
    resolve_buffer: Option<wgpu::Buffer>,
    staging_buffer: Option<wgpu::Buffer>,
    resolved_this_frame: bool,
    last_frame: Vec<EventTiming>,
}

impl EventRecorder {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>, timestamps: bool) -> Self {
        let (query_set, resolve_buffer, staging_buffer) = if timestamps {
            let query_set = device.create_query_set(&wgpu::QuerySetDescriptor {
                label: Some("frame-events"),
                ty: wgpu::QueryType::Timestamp,
                count: MAX_EVENTS,
            });
            let size = MAX_EVENTS as u64 * 8;
            let resolve_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("frame-events-resolve"),
                size,
                usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            });
            let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("frame-events-staging"),
                size,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            });
            (Some(query_set), Some(resolve_buffer), Some(staging_buffer))
        } else {
            log::warn!("timestamp queries unavailable; frame events carry no durations");
            (None, None, None)
        };

        Self {
            device,
            queue,
            descs: Vec::new(),
            frame: Vec::new(),
            query_set,
            resolve_buffer,
            staging_buffer,
            resolved_this_frame: false,
            last_frame: Vec::new(),
        }
    }

    /// Register a (category, label) pair once at init; record it every frame.
    pub fn register(&mut self, category: &str, label: &str) -> EventId {
        let id = EventId(self.descs.len() as u32);
        self.descs.push(EventDesc {
            category: category.to_string(),
            label: label.to_string(),
        });
        id
    }

    pub fn category(&self, id: EventId) -> &str {
        &self.descs[id.0 as usize].category
    }

    pub fn label(&self, id: EventId) -> &str {
        &self.descs[id.0 as usize].label
    }

    pub fn begin_frame(&mut self) {
        self.frame.clear();
        self.resolved_this_frame = false;
    }

    /// Push a marker into the frame log and stamp the device timeline.
    pub fn record(&mut self, id: EventId, encoder: &mut wgpu::CommandEncoder) {
        if self.frame.len() as u32 >= MAX_EVENTS {
            return;
        }
        if let Some(query_set) = &self.query_set {
            encoder.write_timestamp(query_set, self.frame.len() as u32);
        }
        self.frame.push(id);
    }

    /// Resolve this frame's timestamps into the staging buffer. Call after
    /// the last marker, before submission.
    pub fn end_frame(&mut self, encoder: &mut wgpu::CommandEncoder) {
        let (Some(query_set), Some(resolve), Some(staging)) =
            (&self.query_set, &self.resolve_buffer, &self.staging_buffer)
        else {
            return;
        };
        if self.frame.is_empty() {
            return;
        }
        let count = self.frame.len() as u32;
        encoder.resolve_query_set(query_set, 0..count, resolve, 0);
        encoder.copy_buffer_to_buffer(resolve, 0, staging, 0, count as u64 * 8);
        self.resolved_this_frame = true;
    }

    /// Map the resolved timestamps after the frame was presented and turn
    /// them into per-event durations.
    pub fn try_collect(&mut self) {
        let Some(staging) = &self.staging_buffer else {
            return;
        };
        if !self.resolved_this_frame {
            return;
        }
        self.resolved_this_frame = false;

        let count = self.frame.len();
        let slice = staging.slice(0..count as u64 * 8);
        let (sender, receiver) = oneshot_channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        match pollster::block_on(receiver.receive()) {
            Some(Ok(())) => {
                let stamps: Vec<u64> = {
                    let data = slice.get_mapped_range();
                    bytemuck::pod_collect_to_vec(&data[..])
                };
                staging.unmap();

                let period = self.queue.get_timestamp_period();
                let mut timings = Vec::with_capacity(count.saturating_sub(1));
                for i in 0..count.saturating_sub(1) {
                    let ticks = stamps[i + 1].saturating_sub(stamps[i]);
                    timings.push(EventTiming {
                        id: self.frame[i],
                        milliseconds: ticks as f32 * period * 1e-6,
                    });
                }
                self.last_frame = timings;
            }
            Some(Err(e)) => {
                log::warn!("timestamp readback failed: {e}");
                staging.unmap();
            }
            None => {}
        }
    }

    /// Most recent completed frame's samples, in recorded order.
    pub fn last_frame(&self) -> &[EventTiming] {
        &self.last_frame
    }

    /// The ordered markers of the frame currently being recorded.
    pub fn frame_events(&self) -> &[EventId] {
        &self.frame
    }
}
