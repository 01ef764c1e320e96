//! Wire messages.
//!
//! Every datagram carries exactly one message: a 12-byte header followed by
//! a type-specific payload. The header starts with the literal protocol id
//! `ptcs\0`; anything else is rejected before the payload is touched.
//!
//! ```text
//! offset 0   5     6        8            12
//!        | id | type | reserved | sequence_num | payload...
//! ```
//!
//! A message never exceeds 512 bytes, datagram boundaries included — a large
//! membership is split across several self-contained MEMBER_LIST messages.

use crate::codec::{ByteReader, ByteWriter};
use crate::error::{GossipError, Result};
use crate::member::Member;
use crate::vector_clock::{VectorClock, VectorRecord, VECTOR_RECORD_SIZE};

pub const PROTOCOL_ID_LENGTH: usize = 5;
pub const PROTOCOL_ID: [u8; PROTOCOL_ID_LENGTH] = *b"ptcs\0";

pub const MESSAGE_MAX_SIZE: usize = 512;
pub const HEADER_SIZE: usize = 12;

/// Byte offset of the header's sequence-number field. The send drain patches
/// this field in the shared output slot right before each `sendto`.
pub const SEQUENCE_NUM_OFFSET: usize = 8;

/// Largest DATA payload that still fits a 512-byte message.
pub const MAX_DATA_PAYLOAD: usize = MESSAGE_MAX_SIZE - HEADER_SIZE - VECTOR_RECORD_SIZE - 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Hello = 0x01,
    Welcome = 0x02,
    MemberList = 0x03,
    Ack = 0x04,
    Data = 0x05,
    Status = 0x06,
}

impl TryFrom<u8> for MessageType {
    type Error = GossipError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::Hello),
            0x02 => Ok(Self::Welcome),
            0x03 => Ok(Self::MemberList),
            0x04 => Ok(Self::Ack),
            0x05 => Ok(Self::Data),
            0x06 => Ok(Self::Status),
            _ => Err(GossipError::InvalidMessage),
        }
    }
}

/// Reads the type tag of a framed message without decoding the payload.
/// The buffer must hold at least a full header and a valid protocol id.
pub fn peek_type(buffer: &[u8]) -> Result<MessageType> {
    if buffer.len() < HEADER_SIZE {
        return Err(GossipError::BufferNotEnough);
    }
    if buffer[..PROTOCOL_ID_LENGTH] != PROTOCOL_ID {
        return Err(GossipError::InvalidMessage);
    }
    MessageType::try_from(buffer[PROTOCOL_ID_LENGTH])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub message_type: MessageType,
    pub reserved: u16,
    pub sequence_num: u32,
}

impl Header {
    pub fn new(message_type: MessageType, sequence_num: u32) -> Self {
        Self {
            message_type,
            reserved: 0,
            sequence_num,
        }
    }

    fn encode(&self, w: &mut ByteWriter<'_>) -> Result<()> {
        w.put_bytes(&PROTOCOL_ID)?;
        w.put_u8(self.message_type as u8)?;
        w.put_u16(self.reserved)?;
        w.put_u32(self.sequence_num)
    }

    fn decode(r: &mut ByteReader<'_>, expected: MessageType) -> Result<Self> {
        if r.remaining() < HEADER_SIZE {
            return Err(GossipError::BufferNotEnough);
        }
        if r.get_bytes(PROTOCOL_ID_LENGTH)? != PROTOCOL_ID {
            return Err(GossipError::InvalidMessage);
        }
        let message_type = MessageType::try_from(r.get_u8()?)?;
        if message_type != expected {
            return Err(GossipError::InvalidMessage);
        }
        let reserved = r.get_u16()?;
        let sequence_num = r.get_u32()?;
        Ok(Self {
            message_type,
            reserved,
            sequence_num,
        })
    }
}

/// HELLO — a joining node announcing itself to a seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub header: Header,
    pub member: Member,
}

impl Hello {
    pub fn new(member: Member) -> Self {
        Self {
            header: Header::new(MessageType::Hello, 0),
            member,
        }
    }

    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize> {
        let mut w = ByteWriter::new(buffer);
        self.header.encode(&mut w)?;
        self.member.encode(&mut w)?;
        Ok(w.position())
    }

    pub fn decode(buffer: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(buffer);
        let header = Header::decode(&mut r, MessageType::Hello)?;
        let member = Member::decode(&mut r)?;
        Ok(Self { header, member })
    }
}

/// WELCOME — a seed's reply carrying its own identity and the sequence
/// number of the HELLO it answers, so the joiner can cancel the retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Welcome {
    pub header: Header,
    pub hello_sequence_num: u32,
    pub member: Member,
}

impl Welcome {
    pub fn new(hello_sequence_num: u32, member: Member) -> Self {
        Self {
            header: Header::new(MessageType::Welcome, 0),
            hello_sequence_num,
            member,
        }
    }

    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize> {
        let mut w = ByteWriter::new(buffer);
        self.header.encode(&mut w)?;
        w.put_u32(self.hello_sequence_num)?;
        self.member.encode(&mut w)?;
        Ok(w.position())
    }

    pub fn decode(buffer: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(buffer);
        let header = Header::decode(&mut r, MessageType::Welcome)?;
        let hello_sequence_num = r.get_u32()?;
        let member = Member::decode(&mut r)?;
        Ok(Self {
            header,
            hello_sequence_num,
            member,
        })
    }
}

/// MEMBER_LIST — a batch of known members. Self-contained: a large
/// membership arrives as several independent batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberList {
    pub header: Header,
    pub members: Vec<Member>,
}

impl MemberList {
    pub fn new(members: Vec<Member>) -> Self {
        Self {
            header: Header::new(MessageType::MemberList, 0),
            members,
        }
    }

    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize> {
        let mut w = ByteWriter::new(buffer);
        self.header.encode(&mut w)?;
        w.put_u16(self.members.len() as u16)?;
        for member in &self.members {
            member.encode(&mut w)?;
        }
        Ok(w.position())
    }

    pub fn decode(buffer: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(buffer);
        let header = Header::decode(&mut r, MessageType::MemberList)?;
        let members_n = r.get_u16()? as usize;
        let mut members = Vec::with_capacity(members_n.min(64));
        for _ in 0..members_n {
            members.push(Member::decode(&mut r)?);
        }
        Ok(Self { header, members })
    }
}

/// Splits a membership into chunks that each fit one MEMBER_LIST message.
pub fn member_list_chunks(members: &[Member]) -> Vec<Vec<Member>> {
    let budget = MESSAGE_MAX_SIZE - HEADER_SIZE - 2;
    let mut chunks = Vec::new();
    let mut chunk: Vec<Member> = Vec::new();
    let mut used = 0usize;
    for member in members {
        let size = member.wire_size();
        if used + size > budget && !chunk.is_empty() {
            chunks.push(std::mem::take(&mut chunk));
            used = 0;
        }
        used += size;
        chunk.push(*member);
    }
    if !chunk.is_empty() {
        chunks.push(chunk);
    }
    chunks
}

/// ACK — confirms delivery of the message with the given sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub header: Header,
    pub ack_sequence_num: u32,
}

impl Ack {
    pub fn new(ack_sequence_num: u32) -> Self {
        Self {
            header: Header::new(MessageType::Ack, 0),
            ack_sequence_num,
        }
    }

    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize> {
        let mut w = ByteWriter::new(buffer);
        self.header.encode(&mut w)?;
        w.put_u32(self.ack_sequence_num)?;
        Ok(w.position())
    }

    pub fn decode(buffer: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(buffer);
        let header = Header::decode(&mut r, MessageType::Ack)?;
        let ack_sequence_num = r.get_u32()?;
        Ok(Self {
            header,
            ack_sequence_num,
        })
    }
}

/// DATA — one opaque application payload stamped with its originator's
/// vector record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    pub header: Header,
    pub data_version: VectorRecord,
    pub data: Vec<u8>,
}

impl Data {
    pub fn new(data_version: VectorRecord, data: Vec<u8>) -> Self {
        Self {
            header: Header::new(MessageType::Data, 0),
            data_version,
            data,
        }
    }

    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize> {
        if self.data.len() > MAX_DATA_PAYLOAD {
            return Err(GossipError::BufferNotEnough);
        }
        let mut w = ByteWriter::new(buffer);
        self.header.encode(&mut w)?;
        self.data_version.encode(&mut w)?;
        w.put_u16(self.data.len() as u16)?;
        w.put_bytes(&self.data)?;
        Ok(w.position())
    }

    pub fn decode(buffer: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(buffer);
        let header = Header::decode(&mut r, MessageType::Data)?;
        let data_version = VectorRecord::decode(&mut r)?;
        let data_size = r.get_u16()? as usize;
        let data = r.get_bytes(data_size)?.to_vec();
        Ok(Self {
            header,
            data_version,
            data,
        })
    }
}

/// STATUS — the sender's full data clock, driving anti-entropy repair.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub header: Header,
    pub data_version: VectorClock,
}

impl Status {
    pub fn new(data_version: VectorClock) -> Self {
        Self {
            header: Header::new(MessageType::Status, 0),
            data_version,
        }
    }

    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize> {
        let mut w = ByteWriter::new(buffer);
        self.header.encode(&mut w)?;
        self.data_version.encode(&mut w)?;
        Ok(w.position())
    }

    pub fn decode(buffer: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(buffer);
        let header = Header::decode(&mut r, MessageType::Status)?;
        let data_version = VectorClock::decode(&mut r)?;
        Ok(Self {
            header,
            data_version,
        })
    }
}

/// A fully decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello(Hello),
    Welcome(Welcome),
    MemberList(MemberList),
    Ack(Ack),
    Data(Data),
    Status(Status),
}

impl Message {
    pub fn decode(buffer: &[u8]) -> Result<Self> {
        match peek_type(buffer)? {
            MessageType::Hello => Hello::decode(buffer).map(Message::Hello),
            MessageType::Welcome => Welcome::decode(buffer).map(Message::Welcome),
            MessageType::MemberList => MemberList::decode(buffer).map(Message::MemberList),
            MessageType::Ack => Ack::decode(buffer).map(Message::Ack),
            MessageType::Data => Data::decode(buffer).map(Message::Data),
            MessageType::Status => Status::decode(buffer).map(Message::Status),
        }
    }
}
