//! Error code vocabulary shared by all gateways
//!
//! Provider-native status strings (e.g. `EXPIRED`) are echoed verbatim as
//! error codes when they are more specific than these.

pub const NOT_CONFIGURED: &str = "NOT_CONFIGURED";
pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";
pub const PAYMENT_CREATION_FAILED: &str = "PAYMENT_CREATION_FAILED";
pub const NO_REDIRECT_URL: &str = "NO_REDIRECT_URL";
pub const NO_INTEGRATION_ID: &str = "NO_INTEGRATION_ID";
pub const INTENTION_FAILED: &str = "INTENTION_FAILED";
pub const CURRENCY_CONVERSION_FAILED: &str = "CURRENCY_CONVERSION_FAILED";
pub const VERIFICATION_FAILED: &str = "VERIFICATION_FAILED";
pub const AUTH_FAILED: &str = "AUTH_FAILED";
pub const ORDER_FAILED: &str = "ORDER_FAILED";
pub const PAYMENT_KEY_FAILED: &str = "PAYMENT_KEY_FAILED";
pub const TOKENIZATION_FAILED: &str = "TOKENIZATION_FAILED";
pub const TOKENIZATION_DISABLED: &str = "TOKENIZATION_DISABLED";
pub const PAYMENT_FAILED: &str = "PAYMENT_FAILED";
pub const DECLINED: &str = "DECLINED";
pub const REFUND_FAILED: &str = "REFUND_FAILED";
pub const VOID_FAILED: &str = "VOID_FAILED";
pub const VOID_NOT_ALLOWED: &str = "VOID_NOT_ALLOWED";
pub const INQUIRY_FAILED: &str = "INQUIRY_FAILED";
pub const PAYMENT_METHOD_UNUSABLE: &str = "PAYMENT_METHOD_UNUSABLE";
pub const EXCEPTION: &str = "EXCEPTION";

/// User-facing (Arabic) text for an error code
pub fn localized_message(code: &str) -> &'static str {
    match code {
        NOT_CONFIGURED => "بوابة الدفع غير مهيأة",
        INVALID_ARGUMENT => "بيانات الدفع غير صالحة",
        PAYMENT_CREATION_FAILED | INTENTION_FAILED => "فشل في إنشاء طلب الدفع",
        NO_REDIRECT_URL => "لم يتم الحصول على رابط الدفع",
        NO_INTEGRATION_ID => "طريقة الدفع المختارة غير متاحة حالياً",
        CURRENCY_CONVERSION_FAILED => "تعذر تحويل العملة",
        VERIFICATION_FAILED => "فشل في التحقق من الدفع",
        AUTH_FAILED => "فشل الاتصال ببوابة الدفع",
        ORDER_FAILED => "فشل في إنشاء الطلب",
        PAYMENT_KEY_FAILED => "فشل في الحصول على مفتاح الدفع",
        TOKENIZATION_FAILED => "فشل في حفظ البطاقة",
        TOKENIZATION_DISABLED => "حفظ البطاقات غير مفعل",
        PAYMENT_FAILED => "فشلت عملية الدفع",
        DECLINED => "تم رفض عملية الدفع",
        REFUND_FAILED => "فشل في استرداد المبلغ",
        VOID_FAILED => "فشل في إلغاء العملية",
        VOID_NOT_ALLOWED => "لا يمكن إلغاء هذه العملية",
        INQUIRY_FAILED => "فشل في الاستعلام عن العملية",
        PAYMENT_METHOD_UNUSABLE => "طريقة الدفع المحفوظة غير صالحة",
        EXCEPTION => "حدث خطأ غير متوقع",
        _ => provider_status_message(code),
    }
}

fn provider_status_message(status: &str) -> &'static str {
    match status.to_ascii_uppercase().as_str() {
        "PAID" | "DELIVERED" | "CAPTURED" => "تم الدفع بنجاح",
        "NEW" | "PENDING" | "INITIATED" | "IN_PROGRESS" => "في انتظار الدفع",
        "EXPIRED" | "TIMEDOUT" => "انتهت صلاحية الدفع",
        "CANCELED" | "CANCELLED" | "ABANDONED" | "VOID" => "تم إلغاء الدفع",
        "REFUNDED" => "تم استرداد المبلغ",
        "DECLINED" | "RESTRICTED" => "تم رفض عملية الدفع",
        _ => "فشل الدفع",
    }
}
