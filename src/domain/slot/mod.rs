//! Derived bookable windows

pub mod generator;

pub use generator::{
    find_slot, generate_slots, generate_slots_with_limit, open_minutes, slot_start_on,
    GeneratedSlot, SlotKey, MAX_SLOTS_PER_DAY,
};
