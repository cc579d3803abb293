use std::collections::HashMap;

use bytes::Bytes;

use crate::FileId;

type Slot = usize;

#[derive(Debug)]
struct CacheLine {
    file_id: FileId,
    data: Bytes,
    hits: u64,
    prev: Option<Slot>,
    next: Option<Slot>,
}

#[derive(Debug)]
pub struct BlockCache {
    // 0 disables caching.
    capacity: usize,
    lines: Vec<Option<CacheLine>>,
    free: Vec<Slot>,
    map: HashMap<FileId, Slot>,
    head: Option<Slot>, // most recently used
    tail: Option<Slot>, // next to evict
}

impl BlockCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            lines: Vec::with_capacity(capacity),
            free: Vec::new(),
            map: HashMap::with_capacity(capacity),
            head: None,
            tail: None,
        }
    }

    pub fn get(&mut self, file_id: &str) -> Option<Bytes> {
        let slot = *self.map.get(file_id)?;
        self.unlink(slot);
        self.push_front(slot);

        let line = self.line_mut(slot);
        line.hits += 1;
        Some(line.data.clone())
    }

    pub fn put(&mut self, file_id: impl Into<FileId>, data: Bytes) -> Option<FileId> {
        let file_id = file_id.into();
        if self.capacity == 0 || self.map.contains_key(&file_id) {
            return None;
        }

        let evicted = if self.map.len() >= self.capacity {
            self.evict()
        } else {
            None
        };

        let line = CacheLine {
            file_id: file_id.clone(),
            data,
            hits: 1,
            prev: None,
            next: None,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.lines[slot] = Some(line);
                slot
            }
            None => {
                self.lines.push(Some(line));
                self.lines.len() - 1
            }
        };
        self.push_front(slot);
        self.map.insert(file_id, slot);
        evicted
    }

    pub fn remove(&mut self, file_id: &str) -> bool {
        match self.map.remove(file_id) {
            Some(slot) => {
                self.unlink(slot);
                self.lines[slot] = None;
                self.free.push(slot);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, file_id: &str) -> bool {
        self.map.contains_key(file_id)
    }

    pub fn hits(&self, file_id: &str) -> Option<u64> {
        self.map.get(file_id).map(|&slot| self.line(slot).hits)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn recency(&self) -> Vec<FileId> {
        let mut ids = Vec::with_capacity(self.map.len());
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            let line = self.line(slot);
            ids.push(line.file_id.clone());
            cursor = line.next;
        }
        ids
    }

    fn evict(&mut self) -> Option<FileId> {
        let slot = self.tail?;
        self.unlink(slot);
        let line = self.lines[slot].take()?;
        self.free.push(slot);
        self.map.remove(&line.file_id);
        tracing::debug!(
            "Evicting cache line {} after {} hits",
            line.file_id,
            line.hits
        );
        Some(line.file_id)
    }

    fn push_front(&mut self, slot: Slot) {
        let old_head = self.head;
        {
            let line = self.line_mut(slot);
            line.prev = None;
            line.next = old_head;
        }
        match old_head {
            Some(head) => self.line_mut(head).prev = Some(slot),
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
    }

    fn unlink(&mut self, slot: Slot) {
        let (prev, next) = {
            let line = self.line_mut(slot);
            (line.prev.take(), line.next.take())
        };
        match prev {
            Some(prev) => self.line_mut(prev).next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.line_mut(next).prev = prev,
            None => self.tail = prev,
        }
    }

    fn line(&self, slot: Slot) -> &CacheLine {
        match self.lines.get(slot) {
            Some(Some(line)) => line,
            _ => unreachable!("cache slot {} is empty", slot),
        }
    }

    fn line_mut(&mut self, slot: Slot) -> &mut CacheLine {
        match self.lines.get_mut(slot) {
            Some(Some(line)) => line,
            _ => unreachable!("cache slot {} is empty", slot),
        }
    }
}
