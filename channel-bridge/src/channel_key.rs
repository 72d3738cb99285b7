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

use std::fmt::{Display, Formatter};

const SEPARATOR: &str = "//";

/// Identity of one bridged channel: `(environment, channel)`.
///
/// The rendered form `"<environment>//<channel>"` is the worker registry key, the
/// checkpoint record key and the correlation id in logs.
///
/// ```
/// use channel_bridge::ChannelKey;
///
/// let key = ChannelKey::new("prod", "/event/Order__e");
/// assert_eq!(key.as_str(), "prod///event/Order__e");
/// assert_eq!(key.environment(), "prod");
/// ```
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ChannelKey {
    rendered: String,
    environment_len: usize,
}

impl ChannelKey {
    pub fn new(environment: &str, channel: &str) -> Self {
        Self {
            rendered: format!("{environment}{SEPARATOR}{channel}"),
            environment_len: environment.len(),
        }
    }

    pub fn environment(&self) -> &str {
        &self.rendered[..self.environment_len]
    }

    pub fn channel(&self) -> &str {
        &self.rendered[self.environment_len + SEPARATOR.len()..]
    }

    pub fn as_str(&self) -> &str {
        &self.rendered
    }
}

impl Display for ChannelKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::ChannelKey;

    #[test]
    fn splits_back_into_parts_even_when_channel_contains_separator() {
        let key = ChannelKey::new("sandbox", "/data//ChangeEvents");

        assert_eq!(key.as_str(), "sandbox///data//ChangeEvents");
        assert_eq!(key.environment(), "sandbox");
        assert_eq!(key.channel(), "/data//ChangeEvents");
    }

    #[test]
    fn orders_by_rendered_form() {
        let a = ChannelKey::new("a", "z");
        let b = ChannelKey::new("b", "a");

        assert!(a < b);
    }
}
