use std::fmt;

use super::config::{Configuration, SetRef};

fn write_set(f: &mut fmt::Formatter<'_>, flag: &str, set: &SetRef) -> fmt::Result {
    write!(f, " --{} {} {}", flag, set.handle.name(), set.roles)
}

/// Save form of a rule, as accepted by rule tooling.
impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(add) = &self.add_set {
            write_set(f, "ss-add-set", add)?;
            if self.insert_flags.overwrite_existing {
                write!(f, " --ss-exist")?;
            }
            if let Some(timeout) = self.timeout {
                write!(f, " --ss-timeout {}", timeout)?;
            }
        }

        if let Some(del) = &self.del_set {
            write_set(f, "ss-del-set", del)?;
        }

        if let Some(map) = &self.map_set {
            write_set(f, "ss-map-set", map)?;
            if self.map.mark {
                write!(f, " --ss-map-mark")?;
            }
            if self.map.priority {
                write!(f, " --ss-map-prio")?;
            }
            if self.map.queue {
                write!(f, " --ss-map-queue")?;
            }
        }

        if self.mode.invert {
            write!(f, " !")?;
        }
        if self.mode.classify {
            write!(f, " --ss-match")?;
        }
        if self.mode.no_create {
            write!(f, " --ss-nocreate")?;
        }
        if self.probability.is_sampling() {
            write!(f, " --ss-probability {}", self.probability)?;
        }
        if let Some(gt) = self.packets_gt {
            write!(f, " --ss-packets-gt {}", gt)?;
        }
        if self.mode.annotate {
            write!(f, " --ss-flag {}", self.annotation)?;
        }

        Ok(())
    }
}
