//! AMQP 0-9-1 methods used by a client
//!
//! Method                  Sync    Content   Reply
//! ===============================================================
//! connection.open          S                open-ok
//! connection.close         S                close-ok
//! channel.open             S                open-ok
//! channel.flow             S                flow-ok
//! channel.close            S                close-ok
//! exchange.declare         S                declare-ok
//! exchange.delete          S                delete-ok
//! exchange.bind            S                bind-ok
//! exchange.unbind          S                unbind-ok
//! queue.declare            S                declare-ok
//! queue.bind               S                bind-ok
//! queue.purge              S                purge-ok
//! queue.delete             S                delete-ok
//! queue.unbind             S                unbind-ok
//! basic.qos                S                qos-ok
//! basic.consume            S                consume-ok
//! basic.cancel             S                cancel-ok
//! basic.get                S                get-ok | get-empty
//! basic.recover            S                recover-ok
//! confirm.select           S                select-ok
//! basic.publish                    C
//! basic.return                     C
//! basic.deliver                    C
//! basic.get-ok                     C
//! basic.ack / nack / reject
//! ---------------------------------------------------------------

use bytes::{BufMut, Bytes, BytesMut};

use crate::{definitions::MethodId, primitives::get_u16, Error};

pub mod basic;
pub mod channel;
pub mod confirm;
pub mod connection;
pub mod exchange;
pub mod queue;

/// Encoding and decoding of the arguments of a single method
pub trait MethodFields: Sized {
    /// The (class-id, method-id) pair on the wire
    const ID: MethodId;

    /// Writes the arguments, not including the method id
    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error>;

    /// Reads the arguments, the method id has already been consumed
    fn decode(src: &mut Bytes) -> Result<Self, Error>;
}

/// Declares a method without arguments
macro_rules! empty_method {
    ($(#[$attr:meta])* $name:ident, $class_id:expr, $method_id:expr) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Default, PartialEq, Eq)]
        pub struct $name;

        impl $crate::methods::MethodFields for $name {
            const ID: $crate::definitions::MethodId =
                $crate::definitions::MethodId::new($class_id, $method_id);

            fn encode(&self, _dst: &mut bytes::BytesMut) -> Result<(), $crate::Error> {
                Ok(())
            }

            fn decode(_src: &mut bytes::Bytes) -> Result<Self, $crate::Error> {
                Ok(Self)
            }
        }
    };
}
pub(crate) use empty_method;

macro_rules! methods {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        /// Any method a client sends or receives
        #[derive(Debug, Clone, PartialEq)]
        #[allow(missing_docs)]
        pub enum Method {
            $($variant($ty),)*
        }

        impl Method {
            /// The (class-id, method-id) pair of this method
            pub fn id(&self) -> MethodId {
                match self {
                    $(Method::$variant(_) => <$ty as MethodFields>::ID,)*
                }
            }

            /// Writes the method id followed by the arguments
            pub fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
                let id = self.id();
                dst.put_u16(id.class_id);
                dst.put_u16(id.method_id);
                match self {
                    $(Method::$variant(method) => method.encode(dst),)*
                }
            }

            /// Reads a method frame payload
            pub fn decode(src: &mut Bytes) -> Result<Self, Error> {
                let class_id = get_u16(src)?;
                let method_id = get_u16(src)?;
                let id = MethodId::new(class_id, method_id);
                $(
                    if id == <$ty as MethodFields>::ID {
                        return <$ty as MethodFields>::decode(src).map(Method::$variant);
                    }
                )*
                Err(Error::UnknownMethod { class_id, method_id })
            }
        }

        $(
            impl From<$ty> for Method {
                fn from(method: $ty) -> Self {
                    Method::$variant(method)
                }
            }
        )*
    };
}

methods! {
    ConnectionStart(connection::Start),
    ConnectionStartOk(connection::StartOk),
    ConnectionSecure(connection::Secure),
    ConnectionSecureOk(connection::SecureOk),
    ConnectionTune(connection::Tune),
    ConnectionTuneOk(connection::TuneOk),
    ConnectionOpen(connection::Open),
    ConnectionOpenOk(connection::OpenOk),
    ConnectionClose(connection::Close),
    ConnectionCloseOk(connection::CloseOk),
    ConnectionBlocked(connection::Blocked),
    ConnectionUnblocked(connection::Unblocked),

    ChannelOpen(channel::Open),
    ChannelOpenOk(channel::OpenOk),
    ChannelFlow(channel::Flow),
    ChannelFlowOk(channel::FlowOk),
    ChannelClose(channel::Close),
    ChannelCloseOk(channel::CloseOk),

    ExchangeDeclare(exchange::Declare),
    ExchangeDeclareOk(exchange::DeclareOk),
    ExchangeDelete(exchange::Delete),
    ExchangeDeleteOk(exchange::DeleteOk),
    ExchangeBind(exchange::Bind),
    ExchangeBindOk(exchange::BindOk),
    ExchangeUnbind(exchange::Unbind),
    ExchangeUnbindOk(exchange::UnbindOk),

    QueueDeclare(queue::Declare),
    QueueDeclareOk(queue::DeclareOk),
    QueueBind(queue::Bind),
    QueueBindOk(queue::BindOk),
    QueuePurge(queue::Purge),
    QueuePurgeOk(queue::PurgeOk),
    QueueDelete(queue::Delete),
    QueueDeleteOk(queue::DeleteOk),
    QueueUnbind(queue::Unbind),
    QueueUnbindOk(queue::UnbindOk),

    BasicQos(basic::Qos),
    BasicQosOk(basic::QosOk),
    BasicConsume(basic::Consume),
    BasicConsumeOk(basic::ConsumeOk),
    BasicCancel(basic::Cancel),
    BasicCancelOk(basic::CancelOk),
    BasicPublish(basic::Publish),
    BasicReturn(basic::Return),
    BasicDeliver(basic::Deliver),
    BasicGet(basic::Get),
    BasicGetOk(basic::GetOk),
    BasicGetEmpty(basic::GetEmpty),
    BasicAck(basic::Ack),
    BasicReject(basic::Reject),
    BasicRecover(basic::Recover),
    BasicRecoverOk(basic::RecoverOk),
    BasicNack(basic::Nack),

    ConfirmSelect(confirm::Select),
    ConfirmSelectOk(confirm::SelectOk),
}

impl Method {
    /// Whether a content header and body frames follow this method
    pub fn carries_content(&self) -> bool {
        matches!(
            self,
            Method::BasicPublish(_)
                | Method::BasicReturn(_)
                | Method::BasicDeliver(_)
                | Method::BasicGetOk(_)
        )
    }

    /// The replies a peer may answer this request with.
    ///
    /// Empty for asynchronous methods and for replies themselves.
    pub fn replies(&self) -> &'static [MethodId] {
        use crate::methods::MethodFields as M;

        match self {
            Method::ConnectionOpen(_) => &[connection::OpenOk::ID],
            Method::ConnectionClose(_) => &[connection::CloseOk::ID],
            Method::ChannelOpen(_) => &[channel::OpenOk::ID],
            Method::ChannelFlow(_) => &[channel::FlowOk::ID],
            Method::ChannelClose(_) => &[channel::CloseOk::ID],
            Method::ExchangeDeclare(_) => &[<exchange::DeclareOk as M>::ID],
            Method::ExchangeDelete(_) => &[<exchange::DeleteOk as M>::ID],
            Method::ExchangeBind(_) => &[<exchange::BindOk as M>::ID],
            Method::ExchangeUnbind(_) => &[<exchange::UnbindOk as M>::ID],
            Method::QueueDeclare(_) => &[<queue::DeclareOk as M>::ID],
            Method::QueueBind(_) => &[<queue::BindOk as M>::ID],
            Method::QueuePurge(_) => &[<queue::PurgeOk as M>::ID],
            Method::QueueDelete(_) => &[<queue::DeleteOk as M>::ID],
            Method::QueueUnbind(_) => &[<queue::UnbindOk as M>::ID],
            Method::BasicQos(_) => &[<basic::QosOk as M>::ID],
            Method::BasicConsume(_) => &[<basic::ConsumeOk as M>::ID],
            Method::BasicCancel(_) => &[<basic::CancelOk as M>::ID],
            Method::BasicGet(_) => &[<basic::GetOk as M>::ID, <basic::GetEmpty as M>::ID],
            Method::BasicRecover(_) => &[<basic::RecoverOk as M>::ID],
            Method::ConfirmSelect(_) => &[<confirm::SelectOk as M>::ID],
            _ => &[],
        }
    }

    /// Whether this method waits for a reply
    pub fn is_synchronous(&self) -> bool {
        !self.replies().is_empty()
    }
}
