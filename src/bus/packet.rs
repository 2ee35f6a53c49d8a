//! 报文句柄
//!
//! 句柄可廉价克隆，身份由底层分配决定：SUPPRESS 模式下 ACK 表与发送队列共享同一个报文，
//! 表里对其头部的原地改写要对发送队列可见。

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct PacketBuf {
    id: u64,
    data: Mutex<Vec<u8>>,
}

/// 共享的报文缓冲区句柄
#[derive(Clone)]
pub struct Packet {
    inner: Arc<PacketBuf>,
}

impl Packet {
    pub fn new(id: u64, data: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(PacketBuf {
                id,
                data: Mutex::new(data),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 只读访问报文内容
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.bytes())
    }

    /// 可写访问报文内容
    pub fn with_data_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.bytes())
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes().clone()
    }

    /// 是否是同一个缓冲区（而不只是内容相同）
    pub fn same(&self, other: &Packet) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn bytes(&self) -> MutexGuard<'_, Vec<u8>> {
        self.inner.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("id", &self.id())
            .field("len", &self.len())
            .finish()
    }
}
