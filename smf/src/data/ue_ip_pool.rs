//! ue_ip_pool - UE address allocation within one configured subnet
use index_pool::IndexPool;
use ipnet::Ipv4Net;
use parking_lot::Mutex;
use std::fmt;
use std::net::Ipv4Addr;

/// A subnet of UE addresses.  Addresses are tracked as offsets from the network address; the
/// network and broadcast addresses are never handed out, nor is any address excluded because it
/// falls within a static pool.
pub struct UeIpPool {
    subnet: Ipv4Net,
    first_host: u32,
    last_host: u32,
    pool: Mutex<IndexPool>,
}

impl UeIpPool {
    pub fn new(subnet: Ipv4Net) -> Self {
        let subnet = subnet.trunc();
        let size = 1u64 << (32 - subnet.prefix_len());
        let (first_host, last_host) = if subnet.prefix_len() >= 31 {
            (0, (size - 1) as u32)
        } else {
            (1, (size - 2) as u32)
        };
        let mut pool = IndexPool::new();
        for offset in 0..first_host {
            let _ = pool.request_id(offset as usize);
        }
        UeIpPool {
            subnet,
            first_host,
            last_host,
            pool: Mutex::new(pool),
        }
    }

    pub fn subnet(&self) -> Ipv4Net {
        self.subnet
    }

    pub fn contains(&self, addr: &Ipv4Addr) -> bool {
        self.subnet.contains(addr)
    }

    /// Allocates `requested` if it lies in this pool, otherwise the lowest free address.
    pub fn allocate(&self, requested: Option<Ipv4Addr>) -> Option<Ipv4Addr> {
        let mut pool = self.pool.lock();
        if let Some(offset) = requested.and_then(|addr| self.host_offset(&addr)) {
            return pool
                .request_id(offset as usize)
                .ok()
                .map(|_| self.addr_at(offset));
        }
        let offset = pool.new_id() as u32;
        if offset > self.last_host {
            let _ = pool.return_id(offset as usize);
            return None;
        }
        Some(self.addr_at(offset))
    }

    pub fn release(&self, addr: &Ipv4Addr) -> bool {
        match self.host_offset(addr) {
            Some(offset) => self.pool.lock().return_id(offset as usize).is_ok(),
            None => false,
        }
    }

    /// Takes every address of `range` that lies within this pool out of dynamic allocation.
    pub fn exclude(&self, range: &Ipv4Net) {
        let mut pool = self.pool.lock();
        for addr in range.trunc().hosts().chain([range.network(), range.broadcast()]) {
            if let Some(offset) = self.host_offset(&addr) {
                let _ = pool.request_id(offset as usize);
            }
        }
    }

    fn host_offset(&self, addr: &Ipv4Addr) -> Option<u32> {
        if !self.subnet.contains(addr) {
            return None;
        }
        let offset = u32::from(*addr) - u32::from(self.subnet.network());
        (self.first_host..=self.last_host)
            .contains(&offset)
            .then_some(offset)
    }

    fn addr_at(&self, offset: u32) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.subnet.network()) + offset)
    }
}

impl fmt::Debug for UeIpPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UeIpPool({})", self.subnet)
    }
}
