use super::MessageChannel;
use crate::error::ChannelError;
use crate::types::MessageEnvelope;
use dora_node_api::{
    arrow::array::{Array, BinaryArray},
    dora_core::config::DataId,
    DoraNode,
};
use tracing::warn;

/// Runs a [`MessageChannel`] over a dora node.
///
/// The node's event loop feeds every non-tick input into [`DoraChannel::push_input`]; the
/// control loop drains that buffer on its tick and publishes on a single output.
pub struct DoraChannel {
    node: DoraNode,
    output_id: DataId,
    inbox: Vec<Vec<u8>>,
}

impl DoraChannel {
    pub fn new(node: DoraNode, output: &str) -> Self {
        Self {
            node,
            output_id: DataId::from(output.to_owned()),
            inbox: Vec::new(),
        }
    }

    /// Buffers the binary payloads of one dora input until the next drain.
    pub fn push_input(&mut self, input_id: &str, data: &dyn Array) {
        match data.as_any().downcast_ref::<BinaryArray>() {
            Some(array) => {
                for i in 0..array.len() {
                    if !array.is_null(i) {
                        self.inbox.push(array.value(i).to_vec());
                    }
                }
            }
            None => warn!(
                "Input '{}' is not a binary array ({:?}), ignoring",
                input_id,
                data.data_type()
            ),
        }
    }
}

impl MessageChannel for DoraChannel {
    fn send(&mut self, envelope: &MessageEnvelope) -> Result<(), ChannelError> {
        let bytes = envelope.encode()?;
        let arrow_data = BinaryArray::from_vec(vec![bytes.as_slice()]);
        self.node
            .send_output(self.output_id.clone(), Default::default(), arrow_data)
            .map_err(|e| ChannelError::Send(e.to_string()))
    }

    fn drain_raw(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.inbox)
    }
}
