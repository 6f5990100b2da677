//! Platform-conditional TCP_INFO-equivalent harvesting. Gated behind a
//! feature probe: returns `None` on platforms without support rather than
//! failing the run.

/// Kernel counters pulled from a still-open socket.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtendedConnStats {
    pub retransmits: u64,
    pub rtt_us: u64,
    pub rtt_var_us: u64,
    pub congestion_window: u64,
}

/// True on platforms this build knows how to harvest TCP_INFO-equivalent
/// counters on.
pub fn supported() -> bool {
    cfg!(target_os = "linux")
}

#[cfg(target_os = "linux")]
pub fn harvest(fd: std::os::unix::io::RawFd) -> Option<ExtendedConnStats> {
    use std::mem;

    #[repr(C)]
    #[derive(Default)]
    struct TcpInfo {
        state: u8,
        ca_state: u8,
        retransmits: u8,
        probes: u8,
        backoff: u8,
        options: u8,
        snd_wscale_rcv_wscale: u8,
        rto: u32,
        ato: u32,
        snd_mss: u32,
        rcv_mss: u32,
        unacked: u32,
        sacked: u32,
        lost: u32,
        retrans: u32,
        fackets: u32,
        last_data_sent: u32,
        last_ack_sent: u32,
        last_data_recv: u32,
        last_ack_recv: u32,
        pmtu: u32,
        rcv_ssthresh: u32,
        rtt: u32,
        rttvar: u32,
        snd_ssthresh: u32,
        snd_cwnd: u32,
        advmss: u32,
        reordering: u32,
    }

    const TCP_INFO: libc::c_int = 11;

    let mut info = TcpInfo::default();
    let mut len = mem::size_of::<TcpInfo>() as libc::socklen_t;

    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::IPPROTO_TCP,
            TCP_INFO,
            &mut info as *mut _ as *mut libc::c_void,
            &mut len,
        )
    };

    if rc != 0 {
        return None;
    }

    Some(ExtendedConnStats {
        retransmits: info.retrans as u64,
        rtt_us: info.rtt as u64,
        rtt_var_us: info.rttvar as u64,
        congestion_window: info.snd_cwnd as u64,
    })
}

#[cfg(not(target_os = "linux"))]
pub fn harvest(_fd: i32) -> Option<ExtendedConnStats> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_flag_matches_target() {
        assert_eq!(supported(), cfg!(target_os = "linux"));
    }

    #[test]
    fn harvest_on_a_bad_fd_is_none() {
        assert!(harvest(-1).is_none());
    }
}
