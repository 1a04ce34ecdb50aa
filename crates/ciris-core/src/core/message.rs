// ciris-core/src/core/message.rs
// ============================================================================
// Module: CIRIS Ingress Message Model
// Description: Messages delivered by adapters at the core boundary.
// Purpose: Define the single typed ingress shape adapters submit.
// Dependencies: serde, crate::core
// ============================================================================

//! ## Overview
//! Adapters deliver [`IncomingMessage`] values through the ingress function
//! and nothing else. Transport details (chat platform, HTTP, CLI) stay on the
//! adapter side; by the time a message reaches the core it is fully typed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ChannelId;
use crate::core::identifiers::CorrelationId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Incoming Message
// ============================================================================

/// Message submitted by an adapter at ingress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Author identifier on the adapter side.
    pub author_id: String,
    /// Author display name.
    pub author_name: String,
    /// Channel the message arrived on.
    pub channel_id: ChannelId,
    /// Message content.
    pub content: String,
    /// Adapter-observed message time.
    pub timestamp: Timestamp,
    /// Optional correlation identifier supplied by the adapter.
    pub correlation_id: Option<CorrelationId>,
}
