//! End-to-end scenarios exercising a mounted volume through its public
//! surface only, matching the walkthroughs enumerated in this crate's
//! specification.

use std::sync::Arc;

use gosfs::layout::{BLOCK_SIZE, I1_CAP, N_DIR, SECTORS_PER_BLOCK};
use gosfs::{Error, MemBlockDevice, Mount};

fn formatted(total_blocks: u32) -> Arc<Mount<MemBlockDevice>> {
    let dev = Arc::new(MemBlockDevice::new(
        total_blocks as u64 * SECTORS_PER_BLOCK as u64,
    ));
    Arc::new(Mount::format(dev, total_blocks).unwrap())
}

#[test]
fn format_mount_and_stat_root() {
    let m = formatted(4096);
    let st = m.stat(b"/").unwrap();
    assert!(st.is_directory);
    m.sync().unwrap();
}

#[test]
fn nested_mkdir_then_opendir_sees_every_child() {
    let m = formatted(4096);
    m.mkdir(b"/a").unwrap();
    m.mkdir(b"/a/b").unwrap();
    m.mkdir(b"/a/b/c").unwrap();

    let st = m.stat(b"/a/b/c").unwrap();
    assert!(st.is_directory);

    let mut dir = m.opendir(b"/a").unwrap();
    let mut names = Vec::new();
    while let Some((name, _)) = dir.read_entry() {
        names.push(name);
    }
    assert_eq!(names, vec![b"b".to_vec()]);
}

#[test]
fn large_write_spans_into_single_indirect_region_and_reads_back() {
    let m = formatted(16384);
    let mut f = m.open(b"/big.bin", true, true, true).unwrap();

    // One byte per logical block across every direct slot plus well into
    // the single-indirect region, so the write must cross both regions.
    let blocks_to_span = N_DIR as u64 + 32;
    let len = (blocks_to_span * BLOCK_SIZE as u64) as usize;
    let mut pattern = vec![0u8; len];
    for (i, b) in pattern.iter_mut().enumerate() {
        *b = (i % 251) as u8;
    }
    f.write(&pattern).unwrap();

    f.seek(0);
    let mut out = vec![0u8; len];
    let n = f.read(&mut out).unwrap();
    assert_eq!(n, len);
    assert_eq!(out, pattern);

    let st = f.fstat().unwrap();
    assert_eq!(st.size, len as u64);
    assert!(blocks_to_span < N_DIR as u64 + I1_CAP);
}

#[test]
fn allocating_blocks_until_the_volume_is_full_reports_no_space() {
    let m = formatted(80);
    let mut f = m.open(b"/fill", true, true, true).unwrap();
    let chunk = vec![0x5au8; BLOCK_SIZE as usize];
    let mut saw_no_space = false;
    for _ in 0..4096 {
        match f.write(&chunk) {
            Ok(_) => {}
            Err(Error::NoSpace) => {
                saw_no_space = true;
                break;
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert!(saw_no_space);
}

#[test]
fn create_then_delete_a_file_twice_reuses_storage() {
    let m = formatted(4096);

    m.open(b"/note.txt", true, true, true).unwrap();
    m.delete(b"/note.txt").unwrap();
    assert!(m.stat(b"/note.txt").is_err());

    let mut f = m.open(b"/note.txt", true, true, true).unwrap();
    f.write(b"second life").unwrap();
    m.delete(b"/note.txt").unwrap();
    assert!(m.stat(b"/note.txt").is_err());
}

#[test]
fn deleting_a_non_empty_directory_is_rejected() {
    let m = formatted(4096);
    m.mkdir(b"/docs").unwrap();
    m.open(b"/docs/readme.txt", true, true, true).unwrap();

    let err = m.delete(b"/docs").unwrap_err();
    assert_eq!(err, Error::AccessDenied("directory is not empty"));

    m.delete(b"/docs/readme.txt").unwrap();
    m.delete(b"/docs").unwrap();
}

#[test]
fn seeking_past_end_of_file_then_reading_yields_zero_bytes() {
    let m = formatted(4096);
    let mut f = m.open(b"/sparse", true, true, true).unwrap();
    f.write(b"abc").unwrap();
    f.seek(1000);
    let mut buf = [0xffu8; 16];
    let n = f.read(&mut buf).unwrap();
    assert_eq!(n, 0);
    assert_eq!(buf, [0xffu8; 16]);
}

#[test]
fn writing_past_end_of_file_fills_the_gap_with_a_hole_that_reads_as_zero() {
    let m = formatted(4096);
    let mut f = m.open(b"/sparse2", true, true, true).unwrap();
    f.write(b"abc").unwrap();
    f.seek(10);
    f.write(b"xyz").unwrap();

    f.seek(0);
    let mut buf = [0u8; 13];
    f.read(&mut buf).unwrap();
    assert_eq!(&buf[0..3], b"abc");
    assert_eq!(&buf[3..10], &[0u8; 7]);
    assert_eq!(&buf[10..13], b"xyz");
}
