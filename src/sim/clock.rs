//! Minimal game clock driving hour and day ticks.

use crate::sim::events::{EventBus, GameEvent};
use crate::sim::types::{day_of, hour_of, GameTime};

pub const MINUTES_PER_HOUR: u32 = 60;

pub struct GameClock {
    time: GameTime,
    minutes: u32,
    bus: EventBus,
}

impl GameClock {
    pub fn new(bus: EventBus) -> Self {
        Self::starting_at(0, bus)
    }

    pub fn starting_at(time: GameTime, bus: EventBus) -> Self {
        Self {
            time,
            minutes: 0,
            bus,
        }
    }

    pub fn now(&self) -> GameTime {
        self.time
    }

    pub fn hour(&self) -> u8 {
        hour_of(self.time)
    }

    pub fn day(&self) -> u64 {
        day_of(self.time)
    }

    /// Advance one hour, publishing `HourTick` and, at midnight, `DayTick`.
    pub fn tick_hour(&mut self) {
        self.time += 1;
        self.minutes = 0;
        self.bus.publish(GameEvent::HourTick {
            time: self.time,
            hour: self.hour(),
            day: self.day(),
        });
        if self.hour() == 0 {
            self.bus.publish(GameEvent::DayTick { day: self.day() });
        }
    }

    /// Accumulate real-time update minutes; returns how many hour ticks fired.
    pub fn advance_minutes(&mut self, minutes: u32) -> u32 {
        let total = self.minutes + minutes;
        let hours = total / MINUTES_PER_HOUR;
        for _ in 0..hours {
            self.tick_hour();
        }
        self.minutes = total % MINUTES_PER_HOUR;
        hours
    }

    /// Jump to a restored time without publishing ticks.
    pub fn set_time(&mut self, time: GameTime) {
        self.time = time;
        self.minutes = 0;
    }
}
