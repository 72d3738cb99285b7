/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Replay position marker issued by the upstream service.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Totally ordered position within a channel.
///
/// Upstream cursors are monotonically increasing integers. Two negative sentinels
/// ask the upstream service to start from "now" ([`Cursor::LATEST`]) or from the
/// oldest retained event ([`Cursor::EARLIEST`]).
///
/// ```
/// use channel_bridge::Cursor;
///
/// assert!(Cursor::EARLIEST < Cursor::LATEST);
/// assert!(Cursor::LATEST < Cursor::new(1));
/// assert!(Cursor::LATEST.is_sentinel());
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(i64);

impl Cursor {
    /// Start with events published after the subscription is opened.
    pub const LATEST: Cursor = Cursor(-1);
    /// Start with the oldest event the upstream service still retains.
    pub const EARLIEST: Cursor = Cursor(-2);

    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i64 {
        self.0
    }

    pub const fn is_sentinel(self) -> bool {
        self.0 < 0
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::LATEST
    }
}

impl From<i64> for Cursor {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Display for Cursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::Cursor;

    #[test]
    fn serializes_as_bare_integer() {
        let json = serde_json::to_string(&Cursor::new(105)).expect("cursor should serialize");
        assert_eq!(json, "105");

        let parsed: Cursor = serde_json::from_str("-2").expect("cursor should parse");
        assert_eq!(parsed, Cursor::EARLIEST);
    }

    #[test]
    fn real_cursors_order_after_sentinels() {
        assert!(Cursor::new(0) > Cursor::LATEST);
        assert!(!Cursor::new(0).is_sentinel());
        assert_eq!(Cursor::default(), Cursor::LATEST);
    }
}
