// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

mod define_fn_wrapper;
pub(crate) use define_fn_wrapper::define_fn_wrapper;

pub(crate) const ERR_POISONED_LOCK: &str = "poisoned lock - breaker state can no longer be trusted";
