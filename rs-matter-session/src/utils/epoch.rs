/*
 *
 *    Copyright (c) 2020-2024 Project CHIP Authors
 *
 *    Licensed under the Apache License, Version 2.0 (the "License");
 *    you may not use this file except in compliance with the License.
 *    You may obtain a copy of the License at
 *
 *        http://www.apache.org/licenses/LICENSE-2.0
 *
 *    Unless required by applicable law or agreed to in writing, software
 *    distributed under the License is distributed on an "AS IS" BASIS,
 *    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *    See the License for the specific language governing permissions and
 *    limitations under the License.
 */

use core::time::Duration;

/// A monotonic clock used to stamp session activity.
pub type Epoch = fn() -> Duration;

pub fn dummy_epoch() -> Duration {
    Duration::from_secs(0)
}

/// Time elapsed since the first call to this function in the current process.
#[cfg(feature = "std")]
pub fn sys_epoch() -> Duration {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();

    START.get_or_init(std::time::Instant::now).elapsed()
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn sys_epoch_is_monotonic() {
        let first = sys_epoch();
        let second = sys_epoch();
        assert!(second >= first);
    }
}
