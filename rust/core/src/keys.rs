// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Arena keys for the elevation tree.
//!
//! Elevations live in a per-building `slotmap::SlotMap`. A parent owns its
//! children through a list of keys, and each child records its parent's key
//! for height and bottom queries.

use slotmap::new_key_type;

new_key_type! {
    /// Key for an [`Elevation`](crate::elevation::Elevation) within a
    /// [`Building`](crate::building::Building).
    pub struct ElevationKey;
}
