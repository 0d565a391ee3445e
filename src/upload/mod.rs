// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Clip sink module
//
// Finished clips are handed to a sink for delivery (HTTP upload, logging).
// Delivery is fire-and-forget from the recorder's point of view: it runs
// on its own task and failures never reach the recording engine.

pub mod factory;
pub mod http;
pub mod sink;

pub use factory::SinkFactory;
pub use http::HttpUploadSink;
pub use sink::{dispatch, ClipSink, LogSink};
