//! Reassembly of method + header + body frames into complete messages

use amqp091_types::{methods::basic, properties::{BasicProperties, ContentHeader}};
use bytes::{Bytes, BytesMut};

use crate::message::{Delivery, Returned};

/// The method that announced a content
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ContentMethod {
    Deliver(basic::Deliver),
    GetOk(basic::GetOk),
    Return(basic::Return),
}

/// A fully received content
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Assembled {
    Deliver(Delivery),
    GetOk(Delivery),
    Return(Returned),
}

impl Assembled {
    fn new(method: ContentMethod, properties: BasicProperties, body: Bytes) -> Self {
        match method {
            ContentMethod::Deliver(deliver) => {
                Assembled::Deliver(Delivery::from_deliver(deliver, properties, body))
            }
            ContentMethod::GetOk(get_ok) => {
                Assembled::GetOk(Delivery::from_get_ok(get_ok, properties, body))
            }
            ContentMethod::Return(ret) => Assembled::Return(Returned::new(ret, properties, body)),
        }
    }
}

/// Content frames that arrived out of order
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum AssemblyError {
    #[error("Method frame received while a content was still incomplete")]
    Interrupted,

    #[error("Content header received without a preceding content method")]
    UnexpectedHeader,

    #[error("Content body received before its header")]
    UnexpectedBody,

    #[error("Content body exceeds the declared size of {expected} bytes, got {received}")]
    BodyOverrun { expected: u64, received: u64 },
}

#[derive(Debug)]
struct Pending {
    method: ContentMethod,
    header: Option<(BasicProperties, u64)>,
    chunks: Vec<Bytes>,
    received: u64,
}

/// Per channel assembly state. At most one content is in progress at a time.
#[derive(Debug, Default)]
pub(crate) struct ContentAssembler {
    pending: Option<Pending>,
}

impl ContentAssembler {
    pub fn is_assembling(&self) -> bool {
        self.pending.is_some()
    }

    /// A content method arrived, header and body frames follow
    pub fn start(&mut self, method: ContentMethod) -> Result<(), AssemblyError> {
        if self.pending.is_some() {
            return Err(AssemblyError::Interrupted);
        }
        self.pending = Some(Pending {
            method,
            header: None,
            chunks: Vec::new(),
            received: 0,
        });
        Ok(())
    }

    /// Completes right away when the header announces an empty body
    pub fn on_header(&mut self, header: ContentHeader) -> Result<Option<Assembled>, AssemblyError> {
        let pending = match &mut self.pending {
            Some(pending) if pending.header.is_none() => pending,
            _ => return Err(AssemblyError::UnexpectedHeader),
        };
        pending.header = Some((header.properties, header.body_size));
        Ok(self.take_if_complete())
    }

    pub fn on_body(&mut self, chunk: Bytes) -> Result<Option<Assembled>, AssemblyError> {
        let pending = match &mut self.pending {
            Some(pending) => pending,
            None => return Err(AssemblyError::UnexpectedBody),
        };
        let expected = match &pending.header {
            Some((_, size)) => *size,
            None => return Err(AssemblyError::UnexpectedBody),
        };

        let received = pending.received + chunk.len() as u64;
        if received > expected {
            return Err(AssemblyError::BodyOverrun { expected, received });
        }
        pending.received = received;
        if !chunk.is_empty() {
            pending.chunks.push(chunk);
        }
        Ok(self.take_if_complete())
    }

    pub fn reset(&mut self) {
        self.pending = None;
    }

    fn take_if_complete(&mut self) -> Option<Assembled> {
        match &self.pending {
            Some(Pending {
                header: Some((_, size)),
                received,
                ..
            }) if received == size => {}
            _ => return None,
        }

        let pending = self.pending.take()?;
        let (properties, _) = pending.header?;
        let body = concat(pending.chunks);
        Some(Assembled::new(pending.method, properties, body))
    }
}

fn concat(mut chunks: Vec<Bytes>) -> Bytes {
    match chunks.len() {
        0 => Bytes::new(),
        1 => chunks.remove(0),
        _ => {
            let len = chunks.iter().map(Bytes::len).sum();
            let mut buf = BytesMut::with_capacity(len);
            for chunk in chunks {
                buf.extend_from_slice(&chunk);
            }
            buf.freeze()
        }
    }
}

#[cfg(test)]
mod tests {
    use amqp091_types::{
        methods::basic,
        properties::{BasicProperties, ContentHeader},
    };
    use bytes::Bytes;

    use super::{Assembled, AssemblyError, ContentAssembler, ContentMethod};

    fn deliver(tag: u64) -> ContentMethod {
        ContentMethod::Deliver(basic::Deliver {
            consumer_tag: "ctag".into(),
            delivery_tag: tag,
            redelivered: false,
            exchange: "ex1".into(),
            routing_key: "k".into(),
        })
    }

    fn header(size: u64) -> ContentHeader {
        ContentHeader::basic(
            size,
            BasicProperties {
                content_type: Some("text/plain".into()),
                ..Default::default()
            },
        )
    }

    #[test]
    fn body_frames_are_concatenated() {
        let mut assembler = ContentAssembler::default();
        assembler.start(deliver(1)).unwrap();
        assert_eq!(assembler.on_header(header(11)).unwrap(), None);
        assert_eq!(assembler.on_body(Bytes::from_static(b"hello ")).unwrap(), None);

        let done = assembler.on_body(Bytes::from_static(b"world")).unwrap();
        match done {
            Some(Assembled::Deliver(delivery)) => {
                assert_eq!(delivery.delivery_tag, 1);
                assert_eq!(&delivery.body[..], b"hello world");
                assert_eq!(delivery.properties.content_type.as_deref(), Some("text/plain"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!assembler.is_assembling());
    }

    #[test]
    fn empty_body_completes_on_header() {
        let mut assembler = ContentAssembler::default();
        assembler
            .start(ContentMethod::Return(basic::Return {
                reply_code: 312,
                reply_text: "NO_ROUTE".into(),
                exchange: "ex1".into(),
                routing_key: "nowhere".into(),
            }))
            .unwrap();
        let done = assembler.on_header(header(0)).unwrap();
        assert!(matches!(done, Some(Assembled::Return(ref r)) if r.body.is_empty()));
    }

    #[test]
    fn overrun_is_rejected() {
        let mut assembler = ContentAssembler::default();
        assembler.start(deliver(1)).unwrap();
        assembler.on_header(header(3)).unwrap();
        assert_eq!(
            assembler.on_body(Bytes::from_static(b"four")),
            Err(AssemblyError::BodyOverrun {
                expected: 3,
                received: 4
            })
        );
    }

    #[test]
    fn out_of_order_frames_are_rejected() {
        let mut assembler = ContentAssembler::default();
        assert_eq!(
            assembler.on_header(header(1)),
            Err(AssemblyError::UnexpectedHeader)
        );
        assert_eq!(
            assembler.on_body(Bytes::from_static(b"x")),
            Err(AssemblyError::UnexpectedBody)
        );

        assembler.start(deliver(1)).unwrap();
        assert_eq!(
            assembler.on_body(Bytes::from_static(b"x")),
            Err(AssemblyError::UnexpectedBody)
        );
        assert_eq!(assembler.start(deliver(2)), Err(AssemblyError::Interrupted));
    }
}
