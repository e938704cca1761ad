//! Pure conversions from a message shape to the shape it superseded.
//!
//! Each conversion keeps only the fields that existed in the older schema.

use crate::device::{
    DeviceAdded, DeviceAddedV0, DeviceAddedV1, DeviceInfo, DeviceInfoV0, DeviceInfoV1, DeviceList,
    DeviceListV0, DeviceListV1, DeviceMessages,
};
use crate::status::{RequestServerInfo, RequestServerInfoV0};
use crate::Message;

fn message_names(messages: DeviceMessages) -> Vec<String> {
    messages.into_keys().collect()
}

impl From<DeviceInfo> for DeviceInfoV1 {
    fn from(info: DeviceInfo) -> Self {
        Self {
            device_name: info.device_name,
            device_index: info.device_index,
            device_messages: info.device_messages,
        }
    }
}

impl From<DeviceInfoV1> for DeviceInfoV0 {
    fn from(info: DeviceInfoV1) -> Self {
        Self {
            device_name: info.device_name,
            device_index: info.device_index,
            device_messages: message_names(info.device_messages),
        }
    }
}

impl From<DeviceList> for DeviceListV1 {
    fn from(list: DeviceList) -> Self {
        Self {
            id: list.id,
            devices: list.devices.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<DeviceListV1> for DeviceListV0 {
    fn from(list: DeviceListV1) -> Self {
        Self {
            id: list.id,
            devices: list.devices.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<DeviceAdded> for DeviceAddedV1 {
    fn from(added: DeviceAdded) -> Self {
        Self {
            id: added.id,
            device_name: added.device_name,
            device_index: added.device_index,
            device_messages: added.device_messages,
        }
    }
}

impl From<DeviceAddedV1> for DeviceAddedV0 {
    fn from(added: DeviceAddedV1) -> Self {
        Self {
            id: added.id,
            device_name: added.device_name,
            device_index: added.device_index,
            device_messages: message_names(added.device_messages),
        }
    }
}

impl From<RequestServerInfo> for RequestServerInfoV0 {
    fn from(request: RequestServerInfo) -> Self {
        Self {
            id: request.id,
            client_name: request.client_name,
        }
    }
}

impl Message {
    /// Convert into the shape this message superseded.
    ///
    /// Returns `Err(self)` when the message has no older shape.
    ///
    /// # Errors
    ///
    /// Returns the message unchanged if no predecessor shape exists.
    pub fn into_predecessor(self) -> Result<Message, Message> {
        match self {
            Message::DeviceList(m) => Ok(Message::DeviceListV1(m.into())),
            Message::DeviceListV1(m) => Ok(Message::DeviceListV0(m.into())),
            Message::DeviceAdded(m) => Ok(Message::DeviceAddedV1(m.into())),
            Message::DeviceAddedV1(m) => Ok(Message::DeviceAddedV0(m.into())),
            Message::RequestServerInfo(m) => Ok(Message::RequestServerInfoV0(m.into())),
            other => Err(other),
        }
    }
}
