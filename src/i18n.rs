// ==========================================
// 国际化 (i18n) 模块
// ==========================================
// 使用 rust-i18n 库,词条位于 locales/
// 支持中文（默认）和英文
// 注意: rust_i18n::i18n! 宏已在 lib.rs 中初始化
// ==========================================

/// 获取当前语言
pub fn current_locale() -> String {
    rust_i18n::locale().to_string()
}

/// 设置语言
///
/// # 参数
/// - locale: 语言代码（"zh-CN" 或 "en"）
pub fn set_locale(locale: &str) {
    rust_i18n::set_locale(locale);
}

/// 翻译消息
///
/// # 示例
/// ```no_run
/// use field_scheduler::i18n::t;
/// let msg = t("reason.solver_unassigned");
/// ```
pub fn t(key: &str) -> String {
    rust_i18n::t!(key).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ReasonCode;
    use std::sync::Mutex;

    // locale 为全局状态,相关测试串行执行
    static LOCALE_TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_set_locale() {
        let _guard = LOCALE_TEST_LOCK.lock().unwrap();
        set_locale("en");
        assert_eq!(current_locale(), "en");
        set_locale("zh-CN");
        assert_eq!(current_locale(), "zh-CN");
    }

    #[test]
    fn test_reason_descriptions_in_both_locales() {
        let _guard = LOCALE_TEST_LOCK.lock().unwrap();

        set_locale("zh-CN");
        assert_eq!(ReasonCode::ReviewWeeklyHours.description(), "复核: 员工周工时超限");

        set_locale("en");
        assert_eq!(
            ReasonCode::ReviewWeeklyHours.description(),
            "Review: employee exceeds weekly hours"
        );
        for code in ReasonCode::ALL {
            assert!(!code.description().starts_with("reason."), "{} 缺少英文词条", code);
        }

        set_locale("zh-CN");
    }
}
