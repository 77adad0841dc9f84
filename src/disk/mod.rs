//! Disk image plumbing: image file, loop device, partitions, mounts.
//!
//! Build order (each step depends on the previous):
//! 1. Allocate the image file
//! 2. Attach it to a loop device with partition scanning (`losetup -P`)
//! 3. Write an MBR partition table: FAT32 boot, ext4 root
//! 4. Format both partitions
//! 5. Mount root, then boot on `<root>/boot/firmware`
//!
//! Loop devices and mounts are held by guards that release them on drop,
//! so an error anywhere in the build never leaves them attached.

mod image;
mod loop_device;
mod mount;
mod partitions;

pub use image::{create_image_file, image_size_mb};
pub use loop_device::{partition_path, LoopDevice};
pub use mount::{unmount_all, Mount};
pub use partitions::{
    format_partition, partition_disk, partition_uuid, wait_for_partitions, Filesystem,
    BOOT_PARTITION, ROOT_PARTITION,
};
