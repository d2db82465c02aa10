use std::collections::VecDeque;

/// Fixed-capacity history that evicts its oldest entry when full.
#[derive(Clone, Debug)]
pub struct BoundedHistory<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedHistory<T> {
    /// A capacity of zero is bumped to one so the newest entry is always kept.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Appends `value`, returning the evicted oldest entry if the history was full.
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(value);
        evicted
    }

    pub fn newest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_avatar_line() {
        let mut lines = BoundedHistory::new(3);
        assert!(lines.is_empty());

        assert_eq!(lines.push("hello"), None);
        assert_eq!(lines.push("tell me more"), None);
        assert_eq!(lines.push("what does it cost"), None);
        assert_eq!(lines.len(), 3);

        assert_eq!(lines.push("sounds good"), Some("hello"));
        assert_eq!(
            lines.iter().copied().collect::<Vec<_>>(),
            vec!["tell me more", "what does it cost", "sounds good"]
        );
        assert_eq!(lines.newest(), Some(&"sounds good"));
    }

    #[test]
    fn zero_capacity_still_keeps_newest() {
        let mut lines = BoundedHistory::new(0);
        assert_eq!(lines.capacity(), 1);
        lines.push(1);
        assert_eq!(lines.push(2), Some(1));
        assert_eq!(lines.newest(), Some(&2));
    }
}
