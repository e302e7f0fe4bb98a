use proptest::prelude::*;

use super::*;

fn numbered(value: i32) -> StoryEvent {
    StoryEvent::new(StoryEventType::Serial, "PING", value, value as u32).unwrap()
}

#[test]
fn thirteenth_push_is_dropped_and_counted_once() {
    let mut queue = StoryEventQueue::new();
    for value in 0..12 {
        assert!(queue.push(numbered(value)));
    }
    assert!(queue.is_full());
    assert_eq!(queue.dropped(), 0);

    assert!(!queue.push(numbered(12)));
    assert_eq!(queue.dropped(), 1);
    assert_eq!(queue.len(), 12);

    for value in 0..12 {
        assert_eq!(queue.pop().map(|event| event.value), Some(value));
    }
    assert_eq!(queue.pop(), None);
}

#[test]
fn clear_keeps_lifetime_drop_counter() {
    let mut queue = StoryEventQueue::new();
    for value in 0..13 {
        let _ = queue.push(numbered(value));
    }
    queue.clear();
    assert!(queue.is_empty());
    assert_eq!(queue.dropped(), 1);
}

#[test]
fn event_types_parse_case_insensitively() {
    assert_eq!(StoryEventType::parse("UNLOCK"), Some(StoryEventType::Unlock));
    assert_eq!(
        StoryEventType::parse(" audio_done "),
        Some(StoryEventType::AudioDone)
    );
    assert_eq!(StoryEventType::parse("EspNow"), Some(StoryEventType::EspNow));
    assert_eq!(StoryEventType::parse("door"), None);
    assert_eq!(StoryEventType::from_schema("door"), StoryEventType::None);
}

#[test]
fn payload_comparison_ignores_timestamp() {
    let first = StoryEvent::new(StoryEventType::Button, "A", 1, 10).unwrap();
    let later = StoryEvent::new(StoryEventType::Button, "A", 1, 99).unwrap();
    let other = StoryEvent::new(StoryEventType::Button, "A", 2, 10).unwrap();
    assert!(first.same_payload(&later));
    assert!(!first.same_payload(&other));
}

#[test]
fn oversized_event_name_is_rejected() {
    let name = "N".repeat(crate::scenario::STORY_TEXT_BYTES + 1);
    assert!(StoryEvent::new(StoryEventType::Serial, &name, 0, 0).is_err());
}

proptest! {
    #[test]
    fn queue_is_fifo_and_bounded(values in proptest::collection::vec(any::<i32>(), 0..40)) {
        let mut queue = StoryEventQueue::new();
        let mut accepted = 0usize;
        for value in &values {
            if queue.push(numbered(*value)) {
                accepted += 1;
            }
        }

        prop_assert_eq!(accepted, values.len().min(EVENT_QUEUE_CAPACITY));
        prop_assert_eq!(queue.dropped() as usize, values.len() - accepted);

        let drained: std::vec::Vec<i32> = core::iter::from_fn(|| queue.pop())
            .map(|event| event.value)
            .collect();
        prop_assert_eq!(&drained[..], &values[..accepted]);
    }
}
