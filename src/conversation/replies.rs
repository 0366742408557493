//! Reply text. Every function is pure and returns one outbound message.

use chrono::NaiveDate;

use crate::intake::{
    Field, FieldError, IngestionResult, RecordStatus, Site, SiteMode, StructureError,
};
use crate::schedule::{ClosingWindow, display_day};
use crate::store::{
    BlockList, BlockedEntry, Contact, DayRecap, ExportReceipt, SenderTally, StoredRecord,
};

pub fn main_menu() -> String {
    [
        "DAFTAR SEMBAKO BERSUBSIDI",
        "",
        "1. DAFTAR - kirim data antrean",
        "2. CEK - lihat data saya",
        "3. HAPUS - hapus data",
        "4. EDIT - ganti data yang salah",
        "5. BANTUAN",
        "",
        "Ketik angkanya (1-5).",
    ]
    .join("\n")
}

pub fn help(window: &ClosingWindow, undo_minutes: u64) -> String {
    format!(
        "BANTUAN\n\n\
         Pendaftaran tutup setiap hari pukul {start} - {end} WIB.\n\
         1 kartu hanya bisa didaftarkan 1x per hari.\n\
         Salah kirim? Ketik BATAL (maks. {undo_minutes} menit).\n\
         Hapus data: ketik HAPUS 1 atau HAPUS 1,2,3.\n\
         Data salah input: ketik EDIT.\n\n\
         Ketik MENU untuk kembali.",
        start = window.start,
        end = window.end,
    )
}

pub fn site_menu() -> String {
    let mut lines = vec!["PILIH LOKASI".to_string(), String::new()];
    for (i, site) in [Site::Pasarjaya, Site::Dharmajaya].iter().enumerate() {
        lines.push(format!(
            "{}. {} ({} baris)",
            i + 1,
            site.label(),
            site.mode().block_size()
        ));
    }
    lines.push(String::new());
    lines.push("Ketik 1 atau 2. Ketik 0 untuk batal.".to_string());
    lines.join("\n")
}

pub fn sub_site_menu(site: Site) -> String {
    sub_site_lines(format!("LOKASI PENGAMBILAN {}", site.label()), site)
}

pub fn edit_location_menu(site: Site) -> String {
    sub_site_lines(format!("EDIT LOKASI PENGAMBILAN {}", site.label()), site)
}

pub fn location_unknown() -> String {
    "Lokasi data ini tidak dikenali sehingga tidak bisa diubah. Pilih bagian lain.".to_string()
}

fn sub_site_lines(title: String, site: Site) -> String {
    let mut lines = vec![title, String::new()];
    let subs = site.sub_sites();
    for (i, sub) in subs.iter().enumerate() {
        lines.push(format!("{}. {sub}", i + 1));
    }
    if site.allows_manual_sub_site() {
        lines.push(format!("{}. Lokasi lain...", subs.len() + 1));
    }
    lines.push(String::new());
    lines.push("Balas dengan angka pilihan. Ketik 0 untuk batal.".to_string());
    lines.join("\n")
}

pub fn manual_site_prompt() -> String {
    "Ketik nama lokasi pengambilan (minimal 3 huruf). Ketik 0 untuk batal.".to_string()
}

pub fn manual_site_too_short() -> String {
    "Nama lokasi terlalu pendek, minimal 3 huruf.".to_string()
}

fn format_lines(mode: SiteMode) -> &'static str {
    match mode {
        SiteMode::FourLine => "1. Nama\n2. Nomor Kartu\n3. Nomor KTP (NIK)\n4. Nomor KK",
        SiteMode::FiveLine => {
            "1. Nama\n2. Nomor Kartu\n3. Nomor KTP (NIK)\n4. Nomor KK\n5. Tanggal lahir (DD-MM-YYYY)"
        }
    }
}

pub fn site_ready(site: Site, sub_site: &str) -> String {
    let mode = site.mode();
    format!(
        "LOKASI TERPILIH: {}\n\nKirim data dalam {} BARIS:\n{}\n\n\
         Lebih dari 1 orang? Kirim berurutan ke bawah.",
        site.context(sub_site),
        mode.block_size(),
        format_lines(mode)
    )
}

pub fn buffered_prompt() -> String {
    format!("Data diterima. Pilih lokasi dulu ya.\n\n{}", site_menu())
}

pub fn invalid_choice() -> String {
    "Pilihan tidak dikenali. Ketik angka yang tersedia.".to_string()
}

pub fn closed(reopens: &str) -> String {
    format!("Maaf, pendaftaran sedang tutup. Silakan kirim lagi {reopens}.")
}

pub fn structure_rejected(err: &StructureError, site: Site) -> String {
    let expected = site.mode().block_size();
    let detail = match err {
        StructureError::ModeMismatch { lines, .. } => format!(
            "Lokasi {} memakai format {expected} baris per orang, tetapi data Anda {lines} baris \
             (format {} baris). Pilih lokasi yang sesuai atau perbaiki datanya.",
            site.label(),
            site.mode().other().block_size()
        ),
        StructureError::WrongLineCount { lines, .. } => format!(
            "Jumlah baris ({lines}) tidak pas. Setiap orang harus {expected} baris."
        ),
    };
    format!(
        "DATA DITOLAK, tidak ada yang tersimpan.\n\n{detail}\n\nFormat:\n{}",
        format_lines(site.mode())
    )
}

fn error_lines(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("   - {}", e.detail))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Per-record outcome of one ingestion, after the duplicate check.
pub fn ingestion_summary(result: &IngestionResult, written: usize) -> String {
    let mut lines = Vec::new();
    if written > 0 {
        lines.push(format!("BERHASIL TERSIMPAN ({written})"));
        for r in result.records.iter().filter(|r| r.is_ok()) {
            lines.push(format!("{}. {}", r.index, r.fields.name));
        }
    }

    let failed: Vec<_> = result.records.iter().filter(|r| !r.is_ok()).collect();
    if !failed.is_empty() {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push(format!("TIDAK TERSIMPAN ({})", failed.len()));
        for r in failed {
            let name = if r.fields.name.is_empty() {
                "(tanpa nama)"
            } else {
                r.fields.name.as_str()
            };
            lines.push(format!("{}. {name}", r.index));
            match (r.status, &r.duplicate) {
                (RecordStatus::SkipDuplicate, Some(dup)) => {
                    lines.push(format!("   - {}", dup.safe_message.replace('\n', "\n   - ")))
                }
                _ => lines.push(error_lines(&r.errors)),
            }
        }
    }

    if !result.remainder.is_empty() {
        lines.push(String::new());
        lines.push(format!(
            "{} baris terakhir tidak lengkap dan diabaikan.",
            result.remainder.len()
        ));
    }
    lines.join("\n")
}

pub fn record_listing(day: NaiveDate, records: &[StoredRecord]) -> String {
    if records.is_empty() {
        return no_records(day);
    }
    let mut lines = vec![format!("DATA TANGGAL {} ({})", display_day(day), records.len())];
    for (i, r) in records.iter().enumerate() {
        lines.push(format!("{}. {} ({})", i + 1, r.fields.name, r.card_type));
        if let Some(site) = &r.fields.site_context {
            lines.push(format!("   {site}"));
        }
    }
    lines.join("\n")
}

pub fn no_records(day: NaiveDate) -> String {
    format!("Belum ada data untuk tanggal {}.", display_day(day))
}

pub fn check_menu() -> String {
    "CEK DATA\n\n1. Hari ini\n2. Kemarin\n3. Tanggal lain\n\nKetik 0 untuk batal.".to_string()
}

pub fn ask_date() -> String {
    "Ketik tanggal (contoh: 15-08-2026).".to_string()
}

pub fn invalid_date() -> String {
    "Format tanggal tidak dikenali. Contoh: 15-08-2026.".to_string()
}

pub fn delete_prompt(day: NaiveDate, records: &[StoredRecord]) -> String {
    format!(
        "{}\n\nKetik nomor yang ingin dihapus (contoh: 1,2) atau SEMUA. Ketik 0 untuk batal.",
        record_listing(day, records)
    )
}

pub fn deleted(names: &[String]) -> String {
    if names.is_empty() {
        return "Tidak ada data yang dihapus.".to_string();
    }
    format!("Data dihapus ({}):\n{}", names.len(), names.join("\n"))
}

pub fn edit_pick_record(day: NaiveDate, records: &[StoredRecord]) -> String {
    format!(
        "{}\n\nKetik nomor data yang ingin diubah. Ketik 0 untuk batal.",
        record_listing(day, records)
    )
}

pub fn edit_pick_field(record: &StoredRecord) -> String {
    let mut lines = vec![format!("Ubah data {}. Pilih bagian:", record.fields.name)];
    for (i, field) in Field::editable(record.fields.mode()).iter().enumerate() {
        lines.push(format!("{}. {}", i + 1, field.label()));
    }
    lines.push("Ketik 0 untuk batal.".to_string());
    lines.join("\n")
}

pub fn edit_input(field: Field, current: Option<&str>) -> String {
    format!(
        "{} saat ini: {}\nKetik {} yang baru.",
        field.label(),
        current.unwrap_or("-"),
        field.label()
    )
}

pub fn edit_invalid(errors: &[FieldError]) -> String {
    format!("Data baru belum benar:\n{}\n\nCoba ketik lagi.", error_lines(errors))
}

pub fn edit_confirm(field: Field, old: Option<&str>, new: &str) -> String {
    format!(
        "Ubah {}:\n{} -> {new}\n\nKetik 1 / YA untuk simpan, 0 untuk batal.",
        field.label(),
        old.unwrap_or("-")
    )
}

pub fn edit_saved(field: Field, value: &str) -> String {
    format!("{} berhasil diubah menjadi {value}.", field.label())
}

pub fn edit_discarded() -> String {
    "Perubahan dibatalkan, data tidak berubah.".to_string()
}

pub fn cancelled() -> String {
    format!("Dibatalkan.\n\n{}", main_menu())
}

pub fn undo_done(names: &[String]) -> String {
    format!(
        "Kiriman terakhir dibatalkan ({}):\n{}",
        names.len(),
        names.join("\n")
    )
}

pub fn undo_nothing(undo_minutes: u64) -> String {
    format!(
        "Tidak ada kiriman yang bisa dibatalkan (batas {undo_minutes} menit). \
         Gunakan HAPUS untuk menghapus data."
    )
}

pub fn sender_blocked(reason: Option<&str>) -> String {
    match reason {
        Some(reason) => {
            format!("NOMOR ANDA DIBLOKIR\n\nPesan Anda tidak dapat diproses.\nAlasan: {reason}")
        }
        None => "NOMOR ANDA DIBLOKIR\n\nPesan Anda tidak dapat diproses.".to_string(),
    }
}

pub fn generic_failure() -> String {
    "Maaf, sistem sedang sibuk. Data Anda belum diproses, silakan kirim ulang.".to_string()
}

// ── Admin ───────────────────────────────────────────────────────────

pub fn admin_menu() -> String {
    [
        "MENU ADMIN",
        "",
        "1. Rekap hari ini",
        "2. Rekap tanggal tertentu",
        "3. Rekap rentang tanggal",
        "4. Tambah kontak",
        "5. Ubah nama kontak",
        "6. Hapus kontak",
        "7. Broadcast",
        "8. Export data",
        "9. Atur jam tutup",
        "10. Blokir KTP",
        "11. Blokir KK",
        "12. Blokir No HP",
        "13. Hapus data pengirim",
        "0. Keluar",
    ]
    .join("\n")
}

pub fn admin_exit() -> String {
    format!("Keluar dari menu admin.\n\n{}", main_menu())
}

pub fn ask_range() -> String {
    "Ketik rentang tanggal (contoh: 01-08-2026 s/d 07-08-2026).".to_string()
}

pub fn recap(rows: &[DayRecap]) -> String {
    if rows.is_empty() {
        return "Belum ada data pada tanggal tersebut.".to_string();
    }
    let mut lines = vec!["REKAP".to_string()];
    for day in rows {
        lines.push(String::new());
        lines.push(format!(
            "{}: {} data dari {} pengirim",
            display_day(day.day_key),
            day.total,
            day.senders
        ));
        for (site, count) in &day.by_site {
            lines.push(format!("   {site}: {count}"));
        }
    }
    lines.join("\n")
}

pub fn contact_list(contacts: &[Contact], action: &str) -> String {
    let mut lines = vec![format!("Pilih kontak yang ingin {action}:")];
    for (i, c) in contacts.iter().enumerate() {
        lines.push(format!("{}. {} ({})", i + 1, c.name, c.phone));
    }
    lines.push("Ketik 0 untuk kembali.".to_string());
    lines.join("\n")
}

pub fn no_contacts() -> String {
    "Belum ada kontak.".to_string()
}

pub fn ask_contact_name() -> String {
    "Ketik nama kontak.".to_string()
}

pub fn ask_contact_phone() -> String {
    "Ketik nomor HP kontak (contoh: 081234567890).".to_string()
}

pub fn invalid_phone() -> String {
    "Nomor HP tidak valid. Gunakan 9-15 digit.".to_string()
}

pub fn contact_saved(contact: &Contact) -> String {
    format!("Kontak disimpan: {} ({}).", contact.name, contact.phone)
}

pub fn contact_deleted(contact: &Contact, removed: bool) -> String {
    if removed {
        format!("Kontak {} dihapus.", contact.name)
    } else {
        format!("Kontak {} sudah tidak ada.", contact.name)
    }
}

pub fn broadcast_select() -> String {
    "BROADCAST\n\n1. Semua kontak\n2. Pengirim hari ini\n\nKetik 0 untuk kembali.".to_string()
}

pub fn broadcast_compose() -> String {
    "Ketik isi pesan broadcast.".to_string()
}

pub fn broadcast_preview(text: &str) -> String {
    format!(
        "PRATINJAU\n\n{text}\n\n1. Kirim sekarang\n2. Jadwalkan\n0. Batal"
    )
}

pub fn broadcast_schedule_prompt() -> String {
    "Ketik jam kirim (contoh: 17.30) atau tanggal dan jam (contoh: 20-08-2026 17.30).".to_string()
}

pub fn broadcast_time_passed() -> String {
    "Waktu tersebut sudah lewat. Ketik waktu yang akan datang.".to_string()
}

pub fn broadcast_queued(when: &str) -> String {
    format!("Broadcast dijadwalkan {when}.")
}

pub fn export_prompt() -> String {
    "EXPORT DATA\n\n1. Hari ini\n2. Kemarin\nAtau ketik tanggal (DD-MM-YYYY).".to_string()
}

pub fn export_queued(receipt: &ExportReceipt) -> String {
    format!(
        "Export {} ({} data) sedang diproses.",
        display_day(receipt.day_key),
        receipt.rows
    )
}

pub fn block_menu(list: BlockList) -> String {
    let label = list.label();
    format!(
        "KELOLA BLOKIR {label}\n\n1. Tambah {label} ke blokir\n2. Lihat daftar {label} terblokir\n\
         3. Buka blokir {label}\n\n0. Kembali ke menu admin"
    )
}

fn block_value_hint(list: BlockList) -> &'static str {
    match list {
        BlockList::Id | BlockList::Family => "16 digit",
        BlockList::Sender => "contoh: 081234567890",
    }
}

pub fn ask_block_value(list: BlockList) -> String {
    format!("Ketik {} yang akan diblokir ({}).", list.label(), block_value_hint(list))
}

pub fn ask_unblock_value(list: BlockList) -> String {
    format!("Ketik {} yang akan dibuka blokirnya ({}).", list.label(), block_value_hint(list))
}

pub fn invalid_block_value(list: BlockList) -> String {
    format!("{} tidak valid ({}). Coba lagi.", list.label(), block_value_hint(list))
}

pub fn ask_block_reason() -> String {
    "Ketik alasan blokir, atau - jika tanpa alasan.".to_string()
}

pub fn blocked_list(list: BlockList, entries: &[BlockedEntry]) -> String {
    if entries.is_empty() {
        return format!("Belum ada {} yang diblokir.", list.label());
    }
    let mut lines = vec![format!("DAFTAR {} TERBLOKIR ({})", list.label(), entries.len())];
    for (i, e) in entries.iter().enumerate() {
        match &e.reason {
            Some(reason) => lines.push(format!("{}. {} ({reason})", i + 1, e.value)),
            None => lines.push(format!("{}. {}", i + 1, e.value)),
        }
    }
    lines.join("\n")
}

pub fn block_saved(entry: &BlockedEntry) -> String {
    let until = match entry.list {
        BlockList::Id => " sampai akhir bulan",
        BlockList::Family | BlockList::Sender => "",
    };
    format!("{} {} diblokir{until}.", entry.list.label(), entry.value)
}

pub fn unblocked(list: BlockList, value: &str, removed: bool) -> String {
    if removed {
        format!("Blokir {} {value} dibuka.", list.label())
    } else {
        format!("{} {value} tidak ditemukan di daftar blokir.", list.label())
    }
}

pub fn no_senders(day: NaiveDate) -> String {
    format!("Belum ada pengirim pada tanggal {}.", display_day(day))
}

pub fn sender_list(day: NaiveDate, senders: &[SenderTally]) -> String {
    let mut lines = vec![format!("PENGIRIM TANGGAL {}", display_day(day))];
    for (i, t) in senders.iter().enumerate() {
        lines.push(format!("{}. {} ({} data)", i + 1, t.sender, t.records));
    }
    lines.push(String::new());
    lines.push("Ketik nomor pengirim yang datanya akan dihapus. Ketik 0 untuk batal.".to_string());
    lines.join("\n")
}

pub fn sender_records_prompt(sender: &str, day: NaiveDate, records: &[StoredRecord]) -> String {
    format!(
        "DATA MILIK {sender}\n{}\n\nKetik nomor data yang akan dihapus (contoh: 1,3) \
         atau SEMUA. Ketik 0 untuk batal.",
        record_listing(day, records)
    )
}

pub fn ask_close_start(current: &ClosingWindow) -> String {
    format!(
        "Jam tutup saat ini {} - {} WIB.\nKetik jam mulai tutup (contoh: 04.01).",
        current.start, current.end
    )
}

pub fn ask_close_end() -> String {
    "Ketik jam selesai tutup (contoh: 06.00).".to_string()
}

pub fn invalid_time() -> String {
    "Format jam tidak dikenali. Contoh: 04.01.".to_string()
}

pub fn closing_saved(window: &ClosingWindow) -> String {
    format!("Jam tutup diubah menjadi {} - {} WIB.", window.start, window.end)
}
