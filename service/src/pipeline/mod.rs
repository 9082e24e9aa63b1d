//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! The four stages lines pass through between the clients and the mud
//!
//! Client input enters [`ProcessToMud`], which splits and hooks it before
//! [`SendToMud`] writes it. Mud output and proxy messages enter
//! [`ProcessToClient`], which hooks them before [`SendToClient`] fans them out.
//! Every stage is a tracked record and runs exactly once.

mod split;
mod stage;
mod to_client;
mod to_mud;

pub use self::split::{split_batch, split_on_separator};
pub use self::stage::{
    PROCESS_TO_CLIENT, PROCESS_TO_MUD, SEND_TO_CLIENT, SEND_TO_MUD, StageState,
};
pub use self::to_client::{Addressing, ProcessToClient, SendToClient};
pub use self::to_mud::{ProcessToMud, SendToMud};
