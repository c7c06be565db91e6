// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

pub(crate) const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub(crate) const DEFAULT_SUCCESS_THRESHOLD: u32 = 2;
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound of the open timeout; keeps `now + timeout` representable.
pub(crate) const MAX_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);
