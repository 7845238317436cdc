//! Linux Magnetic Tape Driver ioctl definitions.
//!
//! from: /usr/include/x86_64-linux-gnu/sys/mtio.h
//! also see: man 4 st

#[repr(C)]
pub struct mtop {
    pub mt_op: MTCmd,
    pub mt_count: libc::c_int,
}

#[repr(i16)]
#[allow(dead_code)]
pub enum MTCmd {
    MTRESET = 0,
    MTFSF = 1,
    MTBSF = 2,
    MTFSR = 3,
    MTBSR = 4,
    MTWEOF = 5,
    MTREW = 6,
    MTOFFL = 7,
    MTNOP = 8,
    MTEOM = 12,
    MTLOAD = 30,
    MTUNLOAD = 31,
}

nix::ioctl_write_ptr!(mtioctop, b'm', 1, mtop);

#[derive(Default, Debug)]
#[repr(C)]
pub struct mtget {
    pub mt_type: libc::c_long,
    pub mt_resid: libc::c_long,
    pub mt_dsreg: libc::c_long,
    pub mt_gstat: libc::c_long,
    pub mt_erreg: libc::c_long,
    pub mt_fileno: i32,
    pub mt_blkno: i32,
}

nix::ioctl_read!(mtiocget, b'm', 2, mtget);

bitflags::bitflags! {
    pub struct GMTStatusFlags: libc::c_long {
        const EOF = 0x80000000;
        const BOT = 0x40000000;
        const EOT = 0x20000000;
        const EOD = 0x08000000;
        const WR_PROT = 0x04000000;
        const ONLINE = 0x01000000;
    }
}
