//! Textual narinfo record synthesis (component E).

/// Everything needed to render one narinfo record, already resolved from
/// the persistence adapter and the artifact store.
pub struct NarinfoFields<'a> {
    pub store_hash: &'a str,
    pub store_suffix: &'a str,
    pub file_hash: &'a str,
    pub ext: &'a str,
    pub file_size: i64,
    pub nar_hash: &'a str,
    pub nar_size: i64,
    pub deriver: &'a str,
    pub references: &'a [String],
    pub signature: &'a str,
}

impl NarinfoFields<'_> {
    pub fn render(&self) -> String {
        format!(
            "StorePath: /nix/store/{}-{}\n\
             URL: nar/{}.nar.{}\n\
             Compression: {}\n\
             FileHash: sha256:{}\n\
             FileSize: {}\n\
             NarHash: {}\n\
             NarSize: {}\n\
             Deriver: {}\n\
             System: \"x86_64-linux\"\n\
             References: {}\n\
             Sig: {}\n",
            self.store_hash,
            self.store_suffix,
            self.file_hash,
            self.ext,
            self.ext,
            self.file_hash,
            self.file_size,
            self.nar_hash,
            self.nar_size,
            self.deriver,
            self.references.join(" "),
            self.signature,
        )
    }
}

pub const NIX_CACHE_INFO: &str = "Priority: 30\nStoreDir: /nix/store\nWantMassQuery: 1\n";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_exact_format() {
        let fields = NarinfoFields {
            store_hash: "h",
            store_suffix: "s-1.0",
            file_hash: "deadbeef",
            ext: "xz",
            file_size: 123,
            nar_hash: "sha256:abc",
            nar_size: 456,
            deriver: "",
            references: &["r1-a".to_string(), "r2-b".to_string()],
            signature: "c1.host-1:sig==",
        };
        let text = fields.render();
        assert_eq!(
            text,
            "StorePath: /nix/store/h-s-1.0\n\
             URL: nar/deadbeef.nar.xz\n\
             Compression: xz\n\
             FileHash: sha256:deadbeef\n\
             FileSize: 123\n\
             NarHash: sha256:abc\n\
             NarSize: 456\n\
             Deriver: \n\
             System: \"x86_64-linux\"\n\
             References: r1-a r2-b\n\
             Sig: c1.host-1:sig==\n"
        );
    }
}
