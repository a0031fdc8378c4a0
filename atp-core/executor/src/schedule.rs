//! 事件队列
//!
//! 按触发时间升序保存待执行事件, 相同时间按插入顺序 (稳定排序)。

use std::collections::VecDeque;

use crate::event::{ScheduledEvent, SimEvent};
use crate::{ExecutorError, Result};

/// 事件队列
#[derive(Default)]
pub struct EventSchedule {
    events: VecDeque<ScheduledEvent>,
}

impl EventSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入事件并保持有序
    pub fn add(&mut self, time: f64, description: &str, action: Box<dyn SimEvent>) -> Result<()> {
        let event = ScheduledEvent::new(time, description, action)?;
        self.insert(event);
        Ok(())
    }

    /// 插入已构造的事件
    pub fn insert(&mut self, event: ScheduledEvent) {
        // 插到所有 due_time <= t 的事件之后, 相同时间保持插入顺序
        let index = self
            .events
            .partition_point(|e| e.due_time() <= event.due_time());
        self.events.insert(index, event);
    }

    /// 最早事件的触发时间
    pub fn peek_next_time(&self) -> Result<f64> {
        self.events
            .front()
            .map(ScheduledEvent::due_time)
            .ok_or(ExecutorError::EmptySchedule)
    }

    /// 移除并返回最早事件
    pub fn pop_next(&mut self) -> Result<ScheduledEvent> {
        self.events.pop_front().ok_or(ExecutorError::EmptySchedule)
    }

    pub fn count(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// 按顺序列出待执行事件 (时间, 描述)
    pub fn pending(&self) -> Vec<(f64, String)> {
        self.events
            .iter()
            .map(|e| (e.due_time(), e.description().to_string()))
            .collect()
    }
}

impl std::fmt::Debug for EventSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSchedule")
            .field("pending", &self.pending())
            .finish()
    }
}
